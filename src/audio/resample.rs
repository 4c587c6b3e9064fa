//! Sample-rate conversion for replay sources, backed by a rubato
//! `FastFixedIn` resampler.
//!
//! When source and target rates match, `RateConverter` is a passthrough and
//! never builds a rubato session.

use anyhow::{anyhow, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames handed to rubato per call.
pub const DEFAULT_CHUNK: usize = 1024;

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode
    resampler: Option<FastFixedIn<f32>>,
    /// Input held back until a full chunk is available
    input_buf: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
    ratio: f64,
}

impl RateConverter {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(anyhow!(
                "Cannot resample between {}Hz and {}Hz",
                from_rate,
                to_rate
            ));
        }

        let ratio = to_rate as f64 / from_rate as f64;
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                ratio,
            });
        }

        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| anyhow!("resampler init: {e}"))?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        debug!(
            "Resampling enabled from {}Hz to {}Hz ({} frame chunks)",
            from_rate, to_rate, chunk_size
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
            ratio,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Feed samples, returning whatever output full chunks produced.
    ///
    /// Leftover input is kept for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            let (_, produced) = resampler
                .process_into_buffer(&[input], &mut self.output_buf, None)
                .map_err(|e| anyhow!("resampler process: {e}"))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..self.chunk_size);
        }

        Ok(result)
    }

    /// Convert a complete buffer in one go.
    ///
    /// Output is aligned with the input (resampler delay removed) and holds
    /// exactly `len * to_rate / from_rate` samples, rounded.
    pub fn convert(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        if self.is_passthrough() || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let expected = (samples.len() as f64 * self.ratio).round() as usize;
        let mut out = self.process(samples)?;

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(out);
        };
        let delay = resampler.output_delay();

        if !self.input_buf.is_empty() {
            let tail = std::mem::take(&mut self.input_buf);
            let input: &[&[f32]] = &[tail.as_slice()];
            let (_, produced) = resampler
                .process_partial_into_buffer(Some(input), &mut self.output_buf, None)
                .map_err(|e| anyhow!("resampler flush: {e}"))?;
            out.extend_from_slice(&self.output_buf[0][..produced]);
        }

        // Drain the delay line with silence
        while out.len() < delay + expected {
            let (_, produced) = resampler
                .process_partial_into_buffer(None::<&[&[f32]]>, &mut self.output_buf, None)
                .map_err(|e| anyhow!("resampler flush: {e}"))?;
            if produced == 0 {
                break;
            }
            out.extend_from_slice(&self.output_buf[0][..produced]);
        }

        out.drain(..delay.min(out.len()));
        out.truncate(expected);
        resampler.reset();
        Ok(out)
    }
}
