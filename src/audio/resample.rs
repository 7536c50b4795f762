//! Sample-rate conversion and channel mixing.
//!
//! The live session expects **16 kHz mono** PCM.  Capture devices usually
//! run at 44.1 or 48 kHz, so every captured frame goes through:
//!
//! 1. [`stereo_to_mono`]: downmix any number of interleaved channels.
//! 2. [`downsample`]: block-averaging decimation to the target rate.
//!
//! [`resample_linear`] is used on the way out, to stretch 16 kHz response
//! audio to whatever rate the output device runs at.
//!
//! ## Quality
//!
//! [`downsample`] averages each input window without a low-pass filter, so
//! content above the output Nyquist frequency aliases.  For speech going to
//! a remote model this is accepted.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use safechat_voice::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// downsample
// ---------------------------------------------------------------------------

/// Convert `input` from `input_rate` to `output_rate` by block averaging.
///
/// With `ratio = input_rate / output_rate`, output index `i` is the mean of
/// the input window `[floor(i * ratio), floor((i + 1) * ratio))`, clipped to
/// the input.  Output length is `round(input.len() / ratio)`.
///
/// A window is empty only when upsampling (`ratio < 1`).  Such outputs
/// sample-and-hold the input sample at the window start.  Every window
/// starts inside the input, so no output is ever computed from zero
/// samples.
///
/// Equal rates return the input unchanged.  Empty input or a zero rate
/// returns an empty vector.
///
/// # Example
///
/// ```rust
/// use safechat_voice::audio::downsample;
///
/// let input = [0.0_f32, 0.0, 1.0, 1.0, 0.0, 0.0, -1.0, -1.0];
/// assert_eq!(downsample(&input, 32_000, 16_000), vec![0.0, 1.0, 0.0, -1.0]);
/// ```
pub fn downsample(input: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    if input_rate == output_rate {
        return input.to_vec();
    }
    if input.is_empty() || input_rate == 0 || output_rate == 0 {
        return Vec::new();
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let output_len = (input.len() as f64 / ratio).round() as usize;
    let mut output: Vec<f32> = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let start = (i as f64 * ratio).floor() as usize;
        let end = (((i + 1) as f64 * ratio).floor() as usize).min(input.len());

        let sample = if start < end {
            let window = &input[start..end];
            window.iter().sum::<f32>() / window.len() as f32
        } else {
            // start < input.len(): i < round(len / ratio) bounds i * ratio.
            input[start.min(input.len() - 1)]
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` to `target_rate` using linear
/// interpolation.
///
/// Used for output-device rate adaptation where upsampling is the common
/// case.  Equal rates return a clone; empty input or a zero rate returns an
/// empty vector.  Output length is `ceil(len * target_rate / source_rate)`.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- downsample --------------------------------------------------------

    #[test]
    fn equal_rates_return_input_unchanged() {
        let input: Vec<f32> = (0..128).map(|i| (i as f32 / 64.0) - 1.0).collect();
        assert_eq!(downsample(&input, 16_000, 16_000), input);
        assert_eq!(downsample(&input, 48_000, 48_000), input);
    }

    #[test]
    fn ratio_two_averages_consecutive_pairs() {
        let input = [0.0_f32, 0.0, 1.0, 1.0, 0.0, 0.0, -1.0, -1.0];
        assert_eq!(downsample(&input, 32_000, 16_000), vec![0.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn ratio_three_averages_triples() {
        let input = [0.3_f32, 0.6, 0.9, -0.3, -0.6, -0.9];
        let out = downsample(&input, 48_000, 16_000);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.6).abs() < 1e-6);
        assert!((out[1] + 0.6).abs() < 1e-6);
    }

    #[test]
    fn output_length_is_rounded_ratio() {
        for &(len, rin, rout) in &[
            (128usize, 48_000u32, 16_000u32),
            (441, 44_100, 16_000),
            (1_000, 44_100, 16_000),
            (127, 48_000, 16_000),
            (5, 22_050, 16_000),
            (3, 16_000, 22_050),
            (80, 8_000, 16_000),
        ] {
            let input = vec![0.25_f32; len];
            let out = downsample(&input, rin, rout);
            let expected = (len as f64 * rout as f64 / rin as f64).round() as usize;
            assert!(
                out.len().abs_diff(expected) <= 1,
                "{len} @ {rin}->{rout}: expected ~{expected}, got {}",
                out.len()
            );
        }
    }

    #[test]
    fn constant_signal_keeps_amplitude() {
        let input = vec![0.5_f32; 441];
        for &s in &downsample(&input, 44_100, 16_000) {
            assert!((s - 0.5).abs() < 1e-6, "amplitude drift: {s}");
        }
    }

    #[test]
    fn trailing_partial_window_averages_remaining_samples() {
        // ratio 2, len 3 → round(1.5) = 2 outputs; windows [0,2) and [2,3)
        let out = downsample(&[0.2_f32, 0.4, 0.9], 32_000, 16_000);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn window_wider_than_input_is_clipped() {
        // ratio 4, len 2 → round(0.5) = 1 output; window [0,4) clipped to [0,2)
        let out = downsample(&[0.5_f32, 1.0], 64_000, 16_000);
        assert_eq!(out, vec![0.75]);
    }

    #[test]
    fn upsampling_empty_windows_take_start_sample() {
        // ratio 0.5: windows [0,0) [0,1) [1,1) [1,2)
        let out = downsample(&[0.2_f32, 0.8], 8_000, 16_000);
        assert_eq!(out, vec![0.2, 0.2, 0.8, 0.8]);
    }

    #[test]
    fn upsampling_holds_input_samples_for_odd_ratios() {
        let input: Vec<f32> = (0..7).map(|i| i as f32 / 10.0).collect();
        for &rin in &[8_000u32, 11_025, 12_000, 15_999] {
            let out = downsample(&input, rin, 16_000);
            assert!(!out.is_empty());
            assert_eq!(out[0], input[0]);
            assert!(
                out.iter().all(|s| input.contains(s)),
                "{rin}: {out:?} holds a value not in the input"
            );
        }
    }

    #[test]
    fn empty_input_and_zero_rates_yield_empty_output() {
        assert!(downsample(&[], 48_000, 16_000).is_empty());
        assert!(downsample(&[0.1, 0.2], 0, 16_000).is_empty());
        assert!(downsample(&[0.1, 0.2], 48_000, 0).is_empty());
    }

    #[test]
    fn never_produces_nan() {
        let input: Vec<f32> = (0..37).map(|i| (i as f32 * 0.37).sin()).collect();
        for &(rin, rout) in &[(44_100, 16_000), (11_025, 16_000), (96_000, 16_000)] {
            assert!(downsample(&input, rin, rout).iter().all(|s| s.is_finite()));
        }
    }

    // ---- resample_linear ---------------------------------------------------

    #[test]
    fn linear_equal_rates_is_noop() {
        let input = vec![0.1_f32; 160];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn linear_16k_to_48k_length() {
        let input = vec![0.0_f32; 160];
        assert_eq!(resample_linear(&input, 16_000, 48_000).len(), 480);
    }

    #[test]
    fn linear_interpolates_midpoints() {
        let out = resample_linear(&[0.0_f32, 1.0], 16_000, 32_000);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }
}
