use std::fs;

use homebus_codec::{decode_at, NumericSchema};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{codec_error, io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let schema = load_schema(&args.schema)?;
    let bytes = parse_hex(&args.hex)?;

    let value = decode_at(&schema, &bytes, args.base_offset);
    print_value(value.as_ref(), format);
    if value.is_none() {
        tracing::warn!(
            len = bytes.len(),
            offset = schema.effective_offset(args.base_offset),
            length = schema.length,
            "value window does not fit the packet"
        );
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Inline JSON, or `@path` to read it from a file.
fn load_schema(arg: &str) -> CliResult<NumericSchema> {
    let json = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {path}"), err))?,
        None => arg.to_string(),
    };
    NumericSchema::from_json_str(&json).map_err(|err| codec_error("invalid schema", err))
}

#[cfg(test)]
mod tests {
    use homebus_codec::DecodeMode;

    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn loads_inline_schema() {
        let schema = load_schema(r#"{"offset": 4, "length": 2, "decode": "bcd"}"#).unwrap();
        assert_eq!(schema.pattern.offset, Some(4));
        assert_eq!(schema.length, 2);
        assert_eq!(schema.decode, DecodeMode::Bcd);
    }

    #[test]
    fn malformed_schema_is_a_usage_error() {
        assert_eq!(load_schema("{not json").unwrap_err().code, USAGE);
    }
}
