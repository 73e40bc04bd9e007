//! Compressed-PLY adapter.
//!
//! `splat-transform` picks its output encoding from the file name, so the
//! tool always sees a `*.compressed.ply` path. Compression writes to a
//! temporary sibling and renames it to the `.cply` output; decompression
//! hardlinks (or copies) the `.cply` to a temporary sibling instead of
//! renaming the caller's file.

use std::fs;
use std::path::{Path, PathBuf};

use sb_common::CompressionFormat;
use tracing::debug;

use super::{
    check_paths, finish, remove_partial, run_tool, CodecAdapter, CodecError, CodecOutcome,
    InvocationConfig, ToolCommand,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct CompressedPlyAdapter;

const TOOL_SUFFIX: &str = "compressed.ply";

/// `<dir>/<stem>.compressed.ply` next to `path`.
pub(crate) fn tool_path(path: &Path) -> PathBuf {
    path.with_extension(TOOL_SUFFIX)
}

pub(crate) fn compress_command(
    input: &Path,
    tool_output: &Path,
    config: &InvocationConfig,
) -> ToolCommand {
    ToolCommand::new(config.binary.clone())
        .arg(input)
        .arg("--morton-order")
        .args(config.compress_args.iter())
        .arg(tool_output)
}

pub(crate) fn decompress_command(
    tool_input: &Path,
    output: &Path,
    config: &InvocationConfig,
) -> ToolCommand {
    ToolCommand::new(config.binary.clone())
        .arg(tool_input)
        .arg(output)
        .args(config.decompress_args.iter())
}

/// Hardlink `src` to `dst`, copying when linking is not possible.
fn link_or_copy(src: &Path, dst: &Path) -> std::io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = %e, "hard link failed, copying instead");
            fs::copy(src, dst).map(|_| ())
        }
    }
}

impl CodecAdapter for CompressedPlyAdapter {
    fn format(&self) -> CompressionFormat {
        CompressionFormat::Cply
    }

    fn compress(
        &self,
        input_cloud: &Path,
        output: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        check_paths(input_cloud, output)?;
        let tmp = tool_path(output);
        remove_partial(&tmp);

        let cmd = compress_command(input_cloud, &tmp, config);
        let run = run_tool(&cmd, config.timeout, config.gpu.as_ref()).and_then(|run| {
            if !tmp.is_file() {
                return Err(CodecError::MissingOutput {
                    tool: config.binary.clone(),
                    path: tmp.clone(),
                });
            }
            fs::rename(&tmp, output)?;
            Ok(run)
        });
        finish(&config.binary, run, output, &[output, tmp.as_path()])
    }

    fn decompress(
        &self,
        input: &Path,
        output_cloud: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        check_paths(input, output_cloud)?;
        let tmp = tool_path(input);
        if tmp == output_cloud {
            return Err(CodecError::InvalidInput(format!(
                "decompressed output collides with temporary path {}",
                tmp.display()
            )));
        }
        remove_partial(&tmp);
        link_or_copy(input, &tmp)?;

        let cmd = decompress_command(&tmp, output_cloud, config);
        let run = run_tool(&cmd, config.timeout, config.gpu.as_ref());
        remove_partial(&tmp);
        finish(&config.binary, run, output_cloud, &[output_cloud])
    }
}
