//! Int8 scalar quantization of the embedding matrix.
//!
//! Each row gets a symmetric scale `max_abs / 127`, so `code * scale`
//! approximates the original value. The approximate dot product carries a
//! per-row error bound, which lets a scan discard rows that cannot reach
//! the exact top results.

use crate::{
    error::{Result, RetrievalError},
    store::EmbeddingMatrix,
};

/// Absorbs f32 accumulation error in the bound.
const ROUNDING_SLACK: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedMatrix {
    dim: usize,
    scales: Vec<f32>,
    codes: Vec<i8>,
}

impl QuantizedMatrix {
    pub fn quantize(matrix: &EmbeddingMatrix) -> Self {
        let dim = matrix.dim();
        let mut scales = Vec::with_capacity(matrix.rows());
        let mut codes = Vec::with_capacity(matrix.rows() * dim);
        for i in 0..matrix.rows() {
            let row = matrix.row(i);
            let max_abs = row.iter().fold(0.0f32, |m, x| m.max(x.abs()));
            let scale = max_abs / 127.0;
            scales.push(scale);
            if scale > 0.0 {
                codes.extend(
                    row.iter()
                        .map(|x| (x / scale).round().clamp(-127.0, 127.0) as i8),
                );
            } else {
                codes.extend(std::iter::repeat_n(0i8, dim));
            }
        }
        Self { dim, scales, codes }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        self.scales.len()
    }

    /// Approximate dot product of `query` with row `i`.
    #[inline]
    pub fn approx_dot(&self, query: &[f32], i: usize) -> f32 {
        let codes = &self.codes[i * self.dim..(i + 1) * self.dim];
        let sum: f32 = codes
            .iter()
            .zip(query)
            .map(|(&c, &q)| f32::from(c) * q)
            .sum();
        sum * self.scales[i]
    }

    /// Upper bound on `|approx_dot(query, i) - dot(query, row i)|` given
    /// `query_l1 = ‖query‖₁`. Each code is off by at most half a step.
    #[inline]
    pub fn error_bound(&self, i: usize, query_l1: f32) -> f32 {
        self.scales[i] * 0.5 * query_l1 + ROUNDING_SLACK
    }

    /// Serialize as `rows` little-endian f32 scales followed by `rows * dim` codes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.scales.len() * 4 + self.codes.len());
        for scale in &self.scales {
            out.extend_from_slice(&scale.to_le_bytes());
        }
        out.extend_from_slice(bytemuck::cast_slice(&self.codes));
        out
    }

    pub fn from_bytes(bytes: &[u8], rows: usize, dim: usize) -> Result<Self> {
        let scale_bytes = rows * 4;
        if bytes.len() != scale_bytes + rows * dim {
            return Err(RetrievalError::Corrupt(format!(
                "quantized matrix has {} bytes, expected {}",
                bytes.len(),
                scale_bytes + rows * dim
            )));
        }
        let (scales, codes) = bytes.split_at(scale_bytes);
        Ok(Self {
            dim,
            scales: scales
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            codes: bytemuck::cast_slice(codes).to_vec(),
        })
    }
}
