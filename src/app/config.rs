use std::fmt;
use std::str::FromStr;

/// Main configuration struct for the application
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Baud rate used when opening a serial port
    pub baud_rate: u32,
    /// Analyser transform size, must be a power of two
    pub fft_size: usize,
    /// Analyser smoothing constant; 0.0 disables temporal averaging
    pub smoothing: f32,
    /// Target frames per second for the render loops
    pub frame_rate: u32,
    /// Width of the waveform/spectrum drawing surfaces in pixels
    pub surface_width: u32,
    /// Height of the waveform/spectrum drawing surfaces in pixels
    pub surface_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            fft_size: 8192,
            smoothing: 0.0,
            frame_rate: 60,
            surface_width: 300,
            surface_height: 150,
        }
    }
}

impl Config {
    /// Serializes the configuration to a string
    pub fn to_string(&self) -> String {
        format!(
            "baud_rate={}\nfft_size={}\nsmoothing={}\nframe_rate={}\nsurface_width={}\nsurface_height={}",
            self.baud_rate,
            self.fft_size,
            self.smoothing,
            self.frame_rate,
            self.surface_width,
            self.surface_height
        )
    }
}

// Custom error for configuration parsing
#[derive(Debug)]
pub struct ConfigParseError {
    message: String,
}

impl fmt::Display for ConfigParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigParseError {}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigParseError> {
    value.parse().map_err(|_| ConfigParseError {
        message: format!("Invalid value for {}: {}", key, value),
    })
}

impl FromStr for Config {
    type Err = ConfigParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Config::default();

        for line in s.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.splitn(2, '=').collect();
            if parts.len() != 2 {
                return Err(ConfigParseError {
                    message: format!("Invalid line format: {}", line),
                });
            }

            let key = parts[0].trim();
            let value = parts[1].trim();

            match key {
                "baud_rate" => config.baud_rate = parse_value(key, value)?,
                "fft_size" => {
                    let size: usize = parse_value(key, value)?;
                    if !size.is_power_of_two() {
                        return Err(ConfigParseError {
                            message: format!("fft_size must be a power of two, got {}", size),
                        });
                    }
                    config.fft_size = size;
                }
                "smoothing" => {
                    let smoothing: f32 = parse_value(key, value)?;
                    if !(0.0..=1.0).contains(&smoothing) {
                        return Err(ConfigParseError {
                            message: format!("smoothing must be within 0..=1, got {}", smoothing),
                        });
                    }
                    config.smoothing = smoothing;
                }
                "frame_rate" => config.frame_rate = parse_value(key, value)?,
                "surface_width" => config.surface_width = parse_value(key, value)?,
                "surface_height" => config.surface_height = parse_value(key, value)?,
                _ => {
                    return Err(ConfigParseError {
                        message: format!("Unknown configuration key: {}", key),
                    })
                }
            }
        }

        Ok(config)
    }
}
