//! regmirror CLI Client
//!
//! Interactive read/write tool for a running register server. Values wider
//! than one register (floats, 32/64-bit integers, chunked decimals) are
//! packed and unpacked with the wide-value codec; the wire side is plain
//! Modbus TCP.

use std::io::{Read, Write};
use std::net::TcpStream;

use clap::{Parser, Subcommand, ValueEnum};
use rmodbus::client::ModbusRequest;
use rmodbus::{guess_response_frame_len, ModbusProto};

use regmirror::codec::{self, WordOrder};
use regmirror::{RegMirrorError, Result};

/// regmirror CLI
#[derive(Parser, Debug)]
#[command(name = "regmirror-cli")]
#[command(about = "Read and write registers on a regmirror server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1502")]
    server: String,

    /// Modbus unit id
    #[arg(short, long, default_value = "1")]
    unit: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read registers and print one decoded value per line
    Read {
        /// Register type: 0=coil, 1=discrete input, 3=input register,
        /// 4=holding register
        reg_type: u8,

        /// First address
        address: u16,

        /// Number of values (each value spans the format's width in registers)
        #[arg(default_value = "1")]
        count: u16,

        /// Wide-value format for register spaces
        #[arg(short, long, value_enum, default_value = "u16")]
        format: Format,

        /// Present values as signed
        #[arg(long)]
        signed: bool,
    },

    /// Write one value
    Write {
        /// Register type: 0=coil, 4=holding register
        reg_type: u8,

        /// Target address
        address: u16,

        /// Value to write (coils: 1 or 0)
        value: String,

        /// Wide-value format for holding registers
        #[arg(short, long, value_enum, default_value = "u16")]
        format: Format,

        /// Parse the value as signed
        #[arg(long)]
        signed: bool,
    },
}

/// Presentation format of a register-space value.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    /// Single 16-bit register
    U16,
    FloatAbcd,
    FloatBadc,
    FloatCdab,
    FloatDcba,
    Int32,
    Int64,
    /// Chunked decimal, 2 cells (up to 10^8 - 1)
    M10k2,
    /// Chunked decimal, 3 cells (up to 10^12 - 1)
    M10k3,
    /// Chunked decimal, 4 cells (up to 10^16 - 1)
    M10k4,
}

impl Format {
    /// Registers one value of this format occupies.
    fn width(self) -> u16 {
        match self {
            Format::U16 => 1,
            Format::FloatAbcd
            | Format::FloatBadc
            | Format::FloatCdab
            | Format::FloatDcba
            | Format::Int32
            | Format::M10k2 => 2,
            Format::M10k3 => 3,
            Format::Int64 | Format::M10k4 => 4,
        }
    }

    fn word_order(self) -> Option<WordOrder> {
        match self {
            Format::FloatAbcd => Some(WordOrder::Abcd),
            Format::FloatBadc => Some(WordOrder::Badc),
            Format::FloatCdab => Some(WordOrder::Cdab),
            Format::FloatDcba => Some(WordOrder::Dcba),
            _ => None,
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut stream = TcpStream::connect(&args.server)?;
    let mut mreq = ModbusRequest::new(args.unit, ModbusProto::TcpUdp);

    match args.command {
        Commands::Read {
            reg_type,
            address,
            count,
            format,
            signed,
        } => read(&mut stream, &mut mreq, reg_type, address, count, format, signed),
        Commands::Write {
            reg_type,
            address,
            value,
            format,
            signed,
        } => write(&mut stream, &mut mreq, reg_type, address, &value, format, signed),
    }
}

fn read(
    stream: &mut TcpStream,
    mreq: &mut ModbusRequest,
    reg_type: u8,
    address: u16,
    count: u16,
    format: Format,
    signed: bool,
) -> Result<()> {
    let mut request = Vec::new();

    if reg_type <= 1 {
        // bit spaces: the format does not apply, one bit per value
        match reg_type {
            0 => mreq.generate_get_coils(address, count, &mut request)?,
            _ => mreq.generate_get_discretes(address, count, &mut request)?,
        }
        let response = transact(stream, &request)?;
        let mut bits: Vec<bool> = Vec::new();
        mreq.parse_bool(&response, &mut bits)?;
        for bit in bits.iter().take(usize::from(count)) {
            println!("{}", u8::from(*bit));
        }
        return Ok(());
    }

    let width = format.width();
    let total = count.checked_mul(width).ok_or_else(|| {
        RegMirrorError::InvalidArgument(format!("{count} values of width {width} overflow"))
    })?;

    match reg_type {
        3 => mreq.generate_get_inputs(address, total, &mut request)?,
        4 => mreq.generate_get_holdings(address, total, &mut request)?,
        _ => {
            return Err(RegMirrorError::InvalidArgument(
                "invalid register type, valid options are 0, 1, 3 or 4".to_string(),
            ))
        }
    }

    let response = transact(stream, &request)?;
    let mut words: Vec<u16> = Vec::new();
    mreq.parse_u16(&response, &mut words)?;

    for cells in words.chunks_exact(usize::from(width)) {
        print_value(cells, format, signed)?;
    }
    Ok(())
}

fn write(
    stream: &mut TcpStream,
    mreq: &mut ModbusRequest,
    reg_type: u8,
    address: u16,
    value: &str,
    format: Format,
    signed: bool,
) -> Result<()> {
    let mut request = Vec::new();

    match reg_type {
        0 => mreq.generate_set_coil(address, value == "1", &mut request)?,
        4 => {
            let cells = encode_value(value, format, signed)?;
            mreq.generate_set_holdings_bulk(address, &cells, &mut request)?;
        }
        _ => {
            return Err(RegMirrorError::InvalidArgument(
                "invalid register type for write, valid options are 0 or 4".to_string(),
            ))
        }
    }

    let response = transact(stream, &request)?;
    mreq.parse_ok(&response)?;
    Ok(())
}

/// Send one request and read back the complete reply frame.
fn transact(stream: &mut TcpStream, request: &[u8]) -> Result<Vec<u8>> {
    stream.write_all(request)?;

    let mut head = [0u8; 6];
    stream.read_exact(&mut head)?;
    let frame_len = usize::from(guess_response_frame_len(&head, ModbusProto::TcpUdp)?);

    let mut response = head.to_vec();
    if frame_len > head.len() {
        let mut rest = vec![0u8; frame_len - head.len()];
        stream.read_exact(&mut rest)?;
        response.extend(rest);
    }
    Ok(response)
}

fn print_value(cells: &[u16], format: Format, signed: bool) -> Result<()> {
    if let Some(order) = format.word_order() {
        println!("{}", codec::decode_float(cells, order)?);
        return Ok(());
    }
    match format {
        Format::U16 if signed => println!("{}", cells[0] as i16),
        Format::U16 => println!("{}", cells[0]),
        Format::Int32 if signed => println!("{}", codec::decode_i32(cells)?),
        Format::Int32 => println!("{}", codec::decode_u32(cells)?),
        Format::Int64 if signed => println!("{}", codec::decode_i64(cells)?),
        Format::Int64 => println!("{}", codec::decode_u64(cells)?),
        Format::M10k2 | Format::M10k3 | Format::M10k4 => {
            let value = codec::decode_chunked(cells)?;
            if signed {
                println!("{}", value as i64);
            } else {
                println!("{value}");
            }
        }
        _ => unreachable!("float formats handled above"),
    }
    Ok(())
}

fn encode_value(text: &str, format: Format, signed: bool) -> Result<Vec<u16>> {
    if let Some(order) = format.word_order() {
        let value: f32 = parse(text)?;
        return Ok(codec::encode_float(value, order).to_vec());
    }
    let cells = match format {
        Format::U16 if signed => vec![parse::<i16>(text)? as u16],
        Format::U16 => vec![parse::<u16>(text)?],
        Format::Int32 if signed => codec::encode_u32(parse::<i32>(text)? as u32).to_vec(),
        Format::Int32 => codec::encode_u32(parse(text)?).to_vec(),
        Format::Int64 if signed => codec::encode_u64(parse::<i64>(text)? as u64).to_vec(),
        Format::Int64 => codec::encode_u64(parse(text)?).to_vec(),
        // cells carry magnitudes only; sign is presentational on the read side
        Format::M10k2 => codec::encode_chunked(parse_magnitude(text, signed)?, 2)?,
        Format::M10k3 => codec::encode_chunked(parse_magnitude(text, signed)?, 3)?,
        Format::M10k4 => codec::encode_chunked(parse_magnitude(text, signed)?, 4)?,
        _ => unreachable!("float formats handled above"),
    };
    Ok(cells)
}

fn parse<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| RegMirrorError::InvalidArgument(format!("cannot parse value '{text}'")))
}

fn parse_magnitude(text: &str, signed: bool) -> Result<u64> {
    if signed {
        Ok(parse::<i64>(text)?.unsigned_abs())
    } else {
        parse::<u64>(text)
    }
}
