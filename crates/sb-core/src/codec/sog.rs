//! SOG adapter on top of `splat-transform`.

use std::path::Path;

use sb_common::CompressionFormat;

use super::{
    check_paths, finish, run_tool, CodecAdapter, CodecError, CodecOutcome, InvocationConfig,
    ToolCommand,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SogAdapter;

pub(crate) fn compress_command(
    input: &Path,
    output: &Path,
    config: &InvocationConfig,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(config.binary.clone()).arg(input).arg(output);
    if config.use_cpu {
        cmd = cmd.args(["-g", "cpu"]);
    }
    cmd.args(config.compress_args.iter())
}

pub(crate) fn decompress_command(
    input: &Path,
    output: &Path,
    config: &InvocationConfig,
) -> ToolCommand {
    ToolCommand::new(config.binary.clone())
        .arg(input)
        .arg(output)
        .args(config.decompress_args.iter())
}

impl CodecAdapter for SogAdapter {
    fn format(&self) -> CompressionFormat {
        CompressionFormat::Sog
    }

    fn compress(
        &self,
        input_cloud: &Path,
        output: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        check_paths(input_cloud, output)?;
        let cmd = compress_command(input_cloud, output, config);
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
        let cmd = decompress_command(input, output_cloud, config);
        let run = run_tool(&cmd, config.timeout, config.gpu.as_ref());
        finish(&config.binary, run, output_cloud, &[output_cloud])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn config(use_cpu: bool) -> InvocationConfig {
        InvocationConfig {
            binary: "splat-transform".into(),
            compress_args: vec![],
            decompress_args: vec![],
            timeout: None,
            use_cpu,
            gpu: None,
        }
    }

    #[test]
    fn cpu_flag_follows_output() {
        let cmd = compress_command(Path::new("in.ply"), Path::new("out.sog"), &config(true));
        let expected: Vec<OsString> = ["in.ply", "out.sog", "-g", "cpu"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(cmd.args, expected);
    }

    #[test]
    fn gpu_default_has_no_flag() {
        let cmd = compress_command(Path::new("in.ply"), Path::new("out.sog"), &config(false));
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn decompress_ignores_use_cpu() {
        let cmd = decompress_command(Path::new("in.sog"), Path::new("out.ply"), &config(true));
        assert_eq!(cmd.args.len(), 2);
    }
}
