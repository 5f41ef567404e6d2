//! Raw memory dump in the classic 16-bytes-per-line layout
//!
//! ```text
//! 0x140008100: 00 00 00 20 02 00 00 00  00 00 00 00 00 00 00 00  |... ............|
//! ```

use anyhow::Result;
use typescout_core::ReadMemory;
use typescout_core::memory::validate::is_printable_ascii;

use crate::target::Target;

const LINE: usize = 16;

pub fn run(target: &Target, address: u64, size: usize, ascii: bool) -> Result<()> {
    let bytes = target.read_bytes(address, size)?;

    println!("Hexdump at 0x{:X} ({} bytes, {}):", address, size, target.describe());
    println!();
    for line in format_lines(address, &bytes, ascii) {
        println!("{}", line);
    }
    Ok(())
}

fn format_lines(address: u64, bytes: &[u8], ascii: bool) -> Vec<String> {
    bytes
        .chunks(LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("0x{:X}: ", address + (i * LINE) as u64);
            for j in 0..LINE {
                if j == LINE / 2 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }
            if ascii {
                let text: String = chunk
                    .iter()
                    .map(|&b| if is_printable_ascii(b) { b as char } else { '.' })
                    .collect();
                line.push_str(&format!(" |{:<width$}|", text, width = LINE));
            }
            line.trim_end().to_string()
        })
        .collect()
}
