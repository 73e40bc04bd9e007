//! SPZ adapter: `spz encode IN OUT` / `spz decode IN OUT`.

use std::path::Path;

use sb_common::CompressionFormat;

use super::{
    check_paths, finish, run_tool, CodecAdapter, CodecError, CodecOutcome, InvocationConfig,
    ToolCommand,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SpzAdapter;

pub(crate) fn encode_command(input: &Path, output: &Path, config: &InvocationConfig) -> ToolCommand {
    ToolCommand::new(config.binary.clone())
        .arg("encode")
        .arg(input)
        .arg(output)
        .args(config.compress_args.iter())
}

pub(crate) fn decode_command(input: &Path, output: &Path, config: &InvocationConfig) -> ToolCommand {
    ToolCommand::new(config.binary.clone())
        .arg("decode")
        .arg(input)
        .arg(output)
        .args(config.decompress_args.iter())
}

impl CodecAdapter for SpzAdapter {
    fn format(&self) -> CompressionFormat {
        CompressionFormat::Spz
    }

    fn compress(
        &self,
        input_cloud: &Path,
        output: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        check_paths(input_cloud, output)?;
        let cmd = encode_command(input_cloud, output, config);
        let run = run_tool(&cmd, config.timeout, config.gpu.as_ref());
        finish(&config.binary, run, output, &[output])
    }

    fn decompress(
        &self,
        input: &Path,
        output_cloud: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        check_paths(input, output_cloud)?;
        let cmd = decode_command(input, output_cloud, config);
        let run = run_tool(&cmd, config.timeout, config.gpu.as_ref());
        finish(&config.binary, run, output_cloud, &[output_cloud])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn config() -> InvocationConfig {
        InvocationConfig {
            binary: "spz".into(),
            compress_args: vec!["--quiet".into()],
            decompress_args: vec![],
            timeout: None,
            use_cpu: false,
            gpu: None,
        }
    }

    #[test]
    fn encode_line() {
        let cmd = encode_command(Path::new("a.ply"), Path::new("a.spz"), &config());
        let expected: Vec<OsString> = ["encode", "a.ply", "a.spz", "--quiet"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(cmd.binary, "spz");
        assert_eq!(cmd.args, expected);
    }

    #[test]
    fn decode_line() {
        let cmd = decode_command(Path::new("a.spz"), Path::new("out.ply"), &config());
        assert_eq!(cmd.args[0], OsString::from("decode"));
        assert_eq!(cmd.args.len(), 3);
    }
}
