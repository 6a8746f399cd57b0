//! Adaptive Gaussian-mixture background model.
//!
//! Every pixel keeps up to `max_components` Gaussians over its intensity,
//! ordered by `weight / sqrt(variance)`. The leading components whose
//! preceding cumulative weight stays under `background_ratio` describe the
//! background. A pixel is background when its value matched one of those;
//! a foreground pixel that is a darker copy of a background component is
//! reported as shadow.

use crate::detect::backend::BackgroundModel;
use crate::detect::mask::{ForegroundMask, PixelLabel};
use crate::frame::Frame;

pub const DEFAULT_HISTORY: u32 = 500;
pub const DEFAULT_VAR_THRESHOLD: f64 = 16.0;
pub const DEFAULT_DETECT_SHADOWS: bool = true;
pub const DEFAULT_SHADOW_RATIO: f64 = 0.5;
pub const DEFAULT_MAX_COMPONENTS: usize = 5;
pub const DEFAULT_BACKGROUND_RATIO: f64 = 0.9;
pub const DEFAULT_INITIAL_VARIANCE: f64 = 15.0;
pub const DEFAULT_MIN_VARIANCE: f64 = 4.0;
pub const DEFAULT_MAX_VARIANCE: f64 = 75.0;

/// Tuning for [`MixtureBackground`].
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureConfig {
    /// Number of frames the model effectively remembers; learning rate is `1 / history`.
    pub history: u32,
    /// Squared Mahalanobis distance under which a value matches a component.
    pub var_threshold: f64,
    pub detect_shadows: bool,
    /// Lowest brightness ratio against the background still counted as shadow.
    pub shadow_ratio: f64,
    pub max_components: usize,
    pub background_ratio: f64,
    pub initial_variance: f64,
    pub min_variance: f64,
    pub max_variance: f64,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
            detect_shadows: DEFAULT_DETECT_SHADOWS,
            shadow_ratio: DEFAULT_SHADOW_RATIO,
            max_components: DEFAULT_MAX_COMPONENTS,
            background_ratio: DEFAULT_BACKGROUND_RATIO,
            initial_variance: DEFAULT_INITIAL_VARIANCE,
            min_variance: DEFAULT_MIN_VARIANCE,
            max_variance: DEFAULT_MAX_VARIANCE,
        }
    }
}

impl MixtureConfig {
    pub fn learning_rate(&self) -> f64 {
        1.0 / self.history.max(1) as f64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Gaussian {
    pub mean: f64,
    pub variance: f64,
    pub weight: f64,
}

impl Gaussian {
    fn fitness(&self) -> f64 {
        self.weight / self.variance.sqrt()
    }
}

struct Stream {
    width: u32,
    height: u32,
    // `max_components` slots per pixel, the first `counts[i]` of which are live.
    components: Vec<Gaussian>,
    counts: Vec<usize>,
}

/// Per-pixel Gaussian-mixture background model for one stream.
pub struct MixtureBackground {
    config: MixtureConfig,
    stream: Option<Stream>,
}

impl MixtureBackground {
    pub fn new(config: MixtureConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &MixtureConfig {
        &self.config
    }

    /// Live components of one pixel, best first. Empty before the first frame.
    pub fn components_at(&self, x: u32, y: u32) -> &[Gaussian] {
        let Some(stream) = &self.stream else {
            return &[];
        };
        if x >= stream.width || y >= stream.height {
            return &[];
        }
        let k = self.config.max_components.max(1);
        let i = y as usize * stream.width as usize + x as usize;
        &stream.components[i * k..i * k + stream.counts[i]]
    }

    fn classify_pixel(&self, comps: &mut [Gaussian], count: &mut usize, x: f64) -> PixelLabel {
        let cfg = &self.config;
        let alpha = cfg.learning_rate();
        let k = comps.len();
        let n = *count;

        let matched = comps[..n].iter().position(|g| {
            let d = x - g.mean;
            d * d < cfg.var_threshold * g.variance
        });

        let mut idx = match matched {
            Some(m) => {
                let g = &mut comps[m];
                let d = x - g.mean;
                g.mean += alpha * d;
                g.variance = (g.variance + alpha * (d * d - g.variance))
                    .clamp(cfg.min_variance, cfg.max_variance);
                for (i, g) in comps[..n].iter_mut().enumerate() {
                    g.weight *= 1.0 - alpha;
                    if i == m {
                        g.weight += alpha;
                    }
                }
                m
            }
            None => {
                let slot = if n < k {
                    *count += 1;
                    n
                } else {
                    lowest_weight(&comps[..n])
                };
                for g in comps[..n].iter_mut() {
                    g.weight *= 1.0 - alpha;
                }
                comps[slot] = Gaussian {
                    mean: x,
                    variance: cfg.initial_variance,
                    weight: if *count == 1 { 1.0 } else { alpha },
                };
                slot
            }
        };
        let n = *count;

        let total: f64 = comps[..n].iter().map(|g| g.weight).sum();
        if total > 0.0 {
            for g in comps[..n].iter_mut() {
                g.weight /= total;
            }
        }

        // Insertion sort keeps the order stable and lets us follow `idx`.
        for i in 1..n {
            let mut j = i;
            while j > 0 && comps[j].fitness() > comps[j - 1].fitness() {
                comps.swap(j, j - 1);
                if idx == j {
                    idx = j - 1;
                } else if idx == j - 1 {
                    idx = j;
                }
                j -= 1;
            }
        }

        let mut background_len = 0;
        let mut cumulative = 0.0;
        for g in &comps[..n] {
            if cumulative >= cfg.background_ratio {
                break;
            }
            cumulative += g.weight;
            background_len += 1;
        }

        if matched.is_some() && idx < background_len {
            return PixelLabel::Background;
        }

        // The component just created for this value never explains it as shadow.
        if cfg.detect_shadows {
            let is_shadow = comps[..background_len]
                .iter()
                .enumerate()
                .filter(|&(i, g)| !(matched.is_none() && i == idx) && g.mean > 0.0)
                .any(|(_, g)| {
                    let ratio = x / g.mean;
                    ratio >= cfg.shadow_ratio && ratio <= 1.0
                });
            if is_shadow {
                return PixelLabel::Shadow;
            }
        }
        PixelLabel::Foreground
    }
}

impl Default for MixtureBackground {
    fn default() -> Self {
        Self::new(MixtureConfig::default())
    }
}

fn lowest_weight(comps: &[Gaussian]) -> usize {
    let mut lowest = 0;
    for (i, g) in comps.iter().enumerate().skip(1) {
        if g.weight < comps[lowest].weight {
            lowest = i;
        }
    }
    lowest
}

impl BackgroundModel for MixtureBackground {
    fn name(&self) -> &'static str {
        "mixture"
    }

    fn apply(&mut self, frame: &Frame) -> ForegroundMask {
        let (width, height) = frame.dimensions();
        let k = self.config.max_components.max(1);
        let pixels = width as usize * height as usize;

        let mut stream = match self.stream.take() {
            Some(stream) => {
                assert!(
                    (stream.width, stream.height) == (width, height),
                    "frame is {}x{} but the background stream is {}x{}",
                    width,
                    height,
                    stream.width,
                    stream.height
                );
                stream
            }
            None => Stream {
                width,
                height,
                components: vec![Gaussian::default(); pixels * k],
                counts: vec![0; pixels],
            },
        };

        let mut mask = ForegroundMask::new(width, height);
        for (i, (&value, label)) in frame
            .as_raw()
            .iter()
            .zip(mask.labels_mut().iter_mut())
            .enumerate()
        {
            let mut count = stream.counts[i];
            *label = self.classify_pixel(
                &mut stream.components[i * k..(i + 1) * k],
                &mut count,
                value as f64,
            );
            stream.counts[i] = count;
        }

        self.stream = Some(stream);
        mask
    }

    fn reset(&mut self) {
        self.stream = None;
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|s| (s.width, s.height))
    }
}
