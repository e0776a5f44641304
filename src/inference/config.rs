//! Generation configuration

use serde::{Deserialize, Serialize};

/// Sampling and length settings for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on prompt tokens plus generated tokens
    pub max_total_length: usize,
    /// Nucleus sampling threshold (0.0 - 1.0)
    pub top_p: f32,
    /// Temperature for sampling (0.0 = greedy)
    pub temperature: f32,
    /// Whether to sample; forced off when temperature is 0
    pub use_sampling: bool,
    /// Repetition penalty (1.0 = no penalty)
    pub repetition_penalty: f32,
    /// Top-k truncation while sampling (0 = disabled)
    pub top_k: usize,
    /// Random seed for sampling (None = seeded from entropy)
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_total_length: 32768,
            top_p: 0.8,
            temperature: 0.8,
            use_sampling: true,
            repetition_penalty: 1.005,
            top_k: 50,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Whether tokens are drawn at random. Zero temperature always means argmax.
    pub fn sampling_enabled(&self) -> bool {
        self.use_sampling && self.temperature > 0.0
    }

    /// Clamps every field into its valid range.
    pub fn validate(&mut self) {
        if self.top_p.is_nan() {
            self.top_p = 1.0;
        }
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.temperature.is_nan() || self.temperature < 0.0 {
            self.temperature = 0.0;
        }

        if self.repetition_penalty.is_nan() || self.repetition_penalty < 1.0 {
            self.repetition_penalty = 1.0;
        }

        if self.max_total_length == 0 {
            self.max_total_length = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_total_length, 32768);
        assert!((config.top_p - 0.8).abs() < 1e-6);
        assert!((config.temperature - 0.8).abs() < 1e-6);
        assert!(config.use_sampling);
        assert!((config.repetition_penalty - 1.005).abs() < 1e-6);
        assert!(config.sampling_enabled());
    }

    #[test]
    fn test_zero_temperature_forces_greedy() {
        let config = GenerationConfig {
            temperature: 0.0,
            use_sampling: true,
            ..Default::default()
        };
        assert!(!config.sampling_enabled());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = GenerationConfig {
            max_total_length: 0,
            top_p: 1.7,
            temperature: -2.0,
            repetition_penalty: 0.5,
            ..Default::default()
        };
        config.validate();

        assert_eq!(config.max_total_length, 1);
        assert_eq!(config.top_p, 1.0);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.repetition_penalty, 1.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GenerationConfig = serde_json::from_str(r#"{"temperature": 0.0}"#).unwrap();
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_total_length, 32768);
        assert!(!config.sampling_enabled());
    }
}
