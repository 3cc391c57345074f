//! Weekly weather and tariff forecasts consumed by the weekly orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub mod synthetic;

pub use synthetic::SyntheticForecast;

/// Days covered by a weekly forecast.
pub const DAYS_PER_WEEK: usize = 7;
/// Hourly samples per forecast day.
pub const HOURS_PER_DAY: usize = 24;

/// Daily tariff tier of the Tempo scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoColor {
    Blue,
    White,
    Red,
}

impl TempoColor {
    /// Factor applied to the base import price on a day of this color.
    pub fn price_multiplier(&self) -> f64 {
        match self {
            TempoColor::Blue => 0.85,
            TempoColor::White => 1.1,
            TempoColor::Red => 3.0,
        }
    }
}

/// One day of hourly weather.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherProfile {
    /// PV production per hour (kW).
    pub pv_kw: Vec<f64>,
    /// Ambient temperature per hour (°C).
    pub ambient_c: Vec<f64>,
}

/// One day of hourly prices.
#[derive(Debug, Clone, PartialEq)]
pub struct TariffProfile {
    /// Import price per hour (€/kWh).
    pub import_price: Vec<f64>,
    /// Export price per hour (€/kWh).
    pub export_price: Vec<f64>,
    pub color: Option<TempoColor>,
}

/// One hour of a forecast window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSample {
    /// Day index counted from the start of the week, may run past day 6.
    pub day: usize,
    pub hour: usize,
    pub pv_kw: f64,
    pub ambient_c: f64,
    pub import_price: f64,
    pub export_price: f64,
    pub color: Option<TempoColor>,
}

/// 24 hourly samples looking forward from the current hour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastWindow {
    pub samples: Vec<ForecastSample>,
}

impl ForecastWindow {
    /// PV energy forecast for the hours after the current one, within the
    /// first `horizon_h` samples (kWh).
    pub fn pv_energy_kwh(&self, horizon_h: usize) -> f64 {
        self.samples.iter().take(horizon_h).skip(1).map(|s| s.pv_kw).sum()
    }
}

/// One day of forecast resampled to the simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySeries {
    pub pv_kw: Vec<f64>,
    pub ambient_c: Vec<f64>,
    pub import_price: Vec<f64>,
    pub export_price: Vec<f64>,
}

/// Seven days of hourly weather and tariffs.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyForecast {
    /// Day of year of the first day (1..=366).
    pub start_day: u32,
    weather: Vec<WeatherProfile>,
    tariffs: Vec<TariffProfile>,
}

impl WeeklyForecast {
    /// Creates a forecast from seven weather and seven tariff profiles.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ForecastShape`] unless there are exactly seven
    /// days of each and every series holds 24 samples.
    pub fn new(
        start_day: u32,
        weather: Vec<WeatherProfile>,
        tariffs: Vec<TariffProfile>,
    ) -> Result<Self, SimError> {
        let shape_error = |detail: String| SimError::ForecastShape {
            expected: DAYS_PER_WEEK,
            detail,
        };
        if weather.len() != DAYS_PER_WEEK || tariffs.len() != DAYS_PER_WEEK {
            return Err(shape_error(format!(
                "got {} weather and {} tariff days",
                weather.len(),
                tariffs.len()
            )));
        }
        for (day, (w, t)) in weather.iter().zip(&tariffs).enumerate() {
            let lengths = [
                w.pv_kw.len(),
                w.ambient_c.len(),
                t.import_price.len(),
                t.export_price.len(),
            ];
            if lengths.iter().any(|&n| n != HOURS_PER_DAY) {
                return Err(shape_error(format!(
                    "day {day} has series of lengths {lengths:?}"
                )));
            }
        }
        Ok(Self {
            start_day,
            weather,
            tariffs,
        })
    }

    pub fn weather(&self, day: usize) -> &WeatherProfile {
        &self.weather[day.min(DAYS_PER_WEEK - 1)]
    }

    pub fn tariff(&self, day: usize) -> &TariffProfile {
        &self.tariffs[day.min(DAYS_PER_WEEK - 1)]
    }

    /// Forecast for `hour` of `day`. Days past the week repeat the last day.
    pub fn sample(&self, day: usize, hour: usize) -> ForecastSample {
        let weather = self.weather(day);
        let tariff = self.tariff(day);
        let h = hour.min(HOURS_PER_DAY - 1);
        ForecastSample {
            day,
            hour: h,
            pv_kw: weather.pv_kw[h],
            ambient_c: weather.ambient_c[h],
            import_price: tariff.import_price[h],
            export_price: tariff.export_price[h],
            color: tariff.color,
        }
    }

    /// 24-hour window starting at (`day`, `hour`), crossing midnight into
    /// the following days.
    pub fn window(&self, day: usize, hour: usize) -> ForecastWindow {
        let start = day * HOURS_PER_DAY + hour.min(HOURS_PER_DAY - 1);
        ForecastWindow {
            samples: (start..start + HOURS_PER_DAY)
                .map(|abs| self.sample(abs / HOURS_PER_DAY, abs % HOURS_PER_DAY))
                .collect(),
        }
    }

    /// The series of `day` resampled to steps of `dt_hours`.
    pub fn day_series(&self, day: usize, dt_hours: f64) -> DaySeries {
        let weather = self.weather(day);
        let tariff = self.tariff(day);
        DaySeries {
            pv_kw: resample_hourly(&weather.pv_kw, dt_hours),
            ambient_c: resample_hourly(&weather.ambient_c, dt_hours),
            import_price: resample_hourly(&tariff.import_price, dt_hours),
            export_price: resample_hourly(&tariff.export_price, dt_hours),
        }
    }
}

/// Linearly interpolates hourly samples to one day of steps of `dt_hours`.
///
/// Step `k` takes the value at `k * dt_hours`; past the last hour the last
/// sample is held.
///
/// # Examples
///
/// ```
/// use home_energy_sim::forecast::resample_hourly;
///
/// let hourly: Vec<f64> = (0..24).map(f64::from).collect();
/// let quarter = resample_hourly(&hourly, 0.25);
/// assert_eq!(quarter.len(), 96);
/// assert_eq!(quarter[5], 1.25);
/// assert_eq!(quarter[95], 23.0);
/// ```
pub fn resample_hourly(hourly: &[f64], dt_hours: f64) -> Vec<f64> {
    if hourly.is_empty() || dt_hours <= 0.0 {
        return Vec::new();
    }
    let steps = (HOURS_PER_DAY as f64 / dt_hours).round() as usize;
    let last = hourly.len() - 1;
    (0..steps)
        .map(|k| {
            let t = k as f64 * dt_hours;
            let i = (t.floor() as usize).min(last);
            let j = (i + 1).min(last);
            let frac = (t - i as f64).clamp(0.0, 1.0);
            hourly[i] + (hourly[j] - hourly[i]) * frac
        })
        .collect()
}

/// Options shared by forecast providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastOptions {
    /// Installed PV peak power (kW).
    pub pv_peak_kw: f64,
    /// Standard deviation of the cloud noise (0 for clear skies).
    pub cloud_noise_std: f64,
    /// Yearly mean ambient temperature (°C).
    pub ambient_mean_c: f64,
    /// Half amplitude of the daily ambient swing (K).
    pub ambient_swing_c: f64,
    /// Import price outside peak hours (€/kWh).
    pub offpeak_price: f64,
    /// Import price during peak hours (€/kWh).
    pub peak_price: f64,
    pub export_price: f64,
    /// Draw a Tempo color for every day.
    pub tempo: bool,
    /// Night-time household consumption (kW).
    pub base_load_kw: f64,
    /// Evening peak household consumption (kW).
    pub peak_load_kw: f64,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            pv_peak_kw: 4.0,
            cloud_noise_std: 0.25,
            ambient_mean_c: 12.0,
            ambient_swing_c: 5.0,
            offpeak_price: 0.18,
            peak_price: 0.28,
            export_price: 0.10,
            tempo: false,
            base_load_kw: 0.35,
            peak_load_kw: 1.4,
        }
    }
}

/// Source of weekly forecasts, backed by a model, a file or a remote API.
pub trait ForecastProvider {
    /// Builds the forecast of the week starting on day of year `start_day`.
    fn weekly_forecast(
        &self,
        start_day: u32,
        options: &ForecastOptions,
    ) -> Result<WeeklyForecast, SimError>;
}
