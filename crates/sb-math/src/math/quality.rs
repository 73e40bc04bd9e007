//! Size and signal-quality measures.

/// PSNR reported for a perfect reconstruction.
///
/// JSON has no infinity, so lossless results are pinned to this ceiling.
pub const PSNR_CEILING_DB: f64 = 100.0;

/// Bytes per MiB.
pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Peak signal-to-noise ratio in dB for a given MSE and peak value.
///
/// Returns [`PSNR_CEILING_DB`] for a zero MSE and NaN for invalid inputs.
pub fn psnr(mse: f64, peak: f64) -> f64 {
    if mse.is_nan() || mse < 0.0 || peak <= 0.0 {
        return f64::NAN;
    }
    if mse == 0.0 {
        return PSNR_CEILING_DB;
    }
    (10.0 * ((peak * peak) / mse).log10()).min(PSNR_CEILING_DB)
}

/// `original / compressed`, `None` when the compressed size is zero.
pub fn compression_ratio(original_bytes: u64, compressed_bytes: u64) -> Option<f64> {
    (compressed_bytes > 0).then(|| original_bytes as f64 / compressed_bytes as f64)
}

/// Percentage of the original size saved by compression.
///
/// Negative when the compressed artifact is larger than the original.
pub fn size_reduction_percent(original_bytes: u64, compressed_bytes: u64) -> Option<f64> {
    (original_bytes > 0)
        .then(|| (1.0 - compressed_bytes as f64 / original_bytes as f64) * 100.0)
}

pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

/// Logistic sigmoid, used to map stored opacity logits to [0, 1].
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Angle in degrees between two rotations given as (w, x, y, z) quaternions.
///
/// Both inputs are normalized; `q` and `-q` describe the same rotation so the
/// absolute dot product is used. Returns NaN for degenerate quaternions.
pub fn quaternion_angle_deg(a: [f64; 4], b: [f64; 4]) -> f64 {
    if a == b && a.iter().any(|v| *v != 0.0) {
        return 0.0;
    }
    let na = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return f64::NAN;
    }
    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>() / (na * nb);
    (2.0 * dot.abs().min(1.0).acos()).to_degrees()
}
