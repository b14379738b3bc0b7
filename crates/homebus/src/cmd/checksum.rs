use homebus_frame::checksum::{compute, compute2};
use homebus_frame::{Checksum2Kind, ChecksumKind};

use crate::cmd::{parse_hex, ChecksumArgs};
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_checksum, OutputFormat};

pub fn run(args: ChecksumArgs, format: OutputFormat) -> CliResult<i32> {
    let header = parse_hex(&args.header)?;
    let body = parse_hex(&args.hex)?;
    let code = checksum_of(&args.kind, &header, &body)?;
    print_checksum(&args.kind, &code, format);
    Ok(SUCCESS)
}

fn checksum_of(kind: &str, header: &[u8], body: &[u8]) -> CliResult<Vec<u8>> {
    if let Ok(kind) = kind.parse::<Checksum2Kind>() {
        return Ok(compute2(kind, header, body).to_vec());
    }
    match kind.parse::<ChecksumKind>() {
        Ok(ChecksumKind::None) => Err(CliError::new(USAGE, "checksum kind 'none' has no code")),
        Ok(kind) => Ok(vec![compute(kind, header, body)]),
        Err(err) => Err(CliError::new(USAGE, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_single_and_double_codes() {
        assert_eq!(checksum_of("add", &[0xAA], &[0x01, 0x55, 0x02]).unwrap(), vec![0x02]);
        assert_eq!(checksum_of("samsung_rx", &[0xB0], &[0x41, 0x00]).unwrap(), vec![0x71]);
        assert_eq!(
            checksum_of("xor_add", &[0xF7], &[0x01, 0x02]).unwrap(),
            vec![0xF4, 0xEE]
        );
    }

    #[test]
    fn rejects_none_and_unknown_kinds() {
        assert_eq!(checksum_of("none", &[], &[0x01]).unwrap_err().code, USAGE);
        assert_eq!(checksum_of("crc16", &[], &[0x01]).unwrap_err().code, USAGE);
    }
}
