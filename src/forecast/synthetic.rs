//! Seeded synthetic weather, tariff and load profiles.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::SimError;

use super::{
    DAYS_PER_WEEK, ForecastOptions, ForecastProvider, HOURS_PER_DAY, TariffProfile, TempoColor,
    WeatherProfile, WeeklyForecast,
};

/// Day of year with the longest daylight.
const SUMMER_SOLSTICE_DAY: f64 = 172.0;
/// Temporal correlation of the hourly cloud multiplier.
const CLOUD_ALPHA: f64 = 0.8;
/// Cloud multiplier bounds (heavy overcast, cloud-edge enhancement).
const MULTIPLIER_MIN: f64 = 0.2;
const MULTIPLIER_MAX: f64 = 1.2;
/// First and last hour (exclusive) of the peak tariff period.
const PEAK_HOURS: (usize, usize) = (6, 22);

/// Returns a Gaussian sample with zero mean and `std_dev` (Box-Muller).
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * std_dev
}

/// Cosine of the season: 1 at the summer solstice, -1 in midwinter.
fn season(day_of_year: u32) -> f64 {
    (2.0 * PI * (day_of_year as f64 - SUMMER_SOLSTICE_DAY) / 365.0).cos()
}

/// Seeded generator of plausible weekly forecasts.
///
/// PV follows a clear-sky bell between sunrise and sunset whose height and
/// width follow the season, scaled by an AR(1) cloud multiplier. Ambient
/// temperature follows the season and a daily sine. Prices follow a
/// peak/off-peak split, optionally scaled by a Tempo color per day.
#[derive(Debug, Clone)]
pub struct SyntheticForecast {
    pub seed: u64,
}

impl SyntheticForecast {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Clear-sky PV fraction of peak at fractional hour `t`.
    pub fn clear_sky_fraction(day_of_year: u32, t: f64) -> f64 {
        let s = season(day_of_year);
        let daylight_h = 12.0 + 4.0 * s;
        let sunrise = 13.0 - daylight_h / 2.0;
        let x = (t - sunrise) / daylight_h;
        if !(0.0..=1.0).contains(&x) {
            return 0.0;
        }
        (0.6 + 0.4 * s) * (PI * x).sin()
    }

    fn tempo_color(rng: &mut StdRng, day_of_year: u32) -> TempoColor {
        let winter = !(91..305).contains(&day_of_year);
        let draw: f64 = rng.random();
        match (winter, draw) {
            (true, d) if d < 0.15 => TempoColor::Red,
            (_, d) if d < 0.35 => TempoColor::White,
            _ => TempoColor::Blue,
        }
    }

    fn weather_day(
        &self,
        rng: &mut StdRng,
        multiplier: &mut f64,
        day_of_year: u32,
        options: &ForecastOptions,
    ) -> WeatherProfile {
        let mut pv_kw = Vec::with_capacity(HOURS_PER_DAY);
        let mut ambient_c = Vec::with_capacity(HOURS_PER_DAY);
        let daily_mean = options.ambient_mean_c + 8.0 * season(day_of_year);
        for h in 0..HOURS_PER_DAY {
            let epsilon = gaussian_noise(rng, options.cloud_noise_std);
            *multiplier = (CLOUD_ALPHA * *multiplier + (1.0 - CLOUD_ALPHA) * (1.0 + epsilon))
                .clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
            let clear = Self::clear_sky_fraction(day_of_year, h as f64 + 0.5);
            pv_kw.push((options.pv_peak_kw * clear * *multiplier).max(0.0));

            let daily = (2.0 * PI * (h as f64 - 9.0) / 24.0).sin();
            ambient_c.push(daily_mean + options.ambient_swing_c * daily);
        }
        WeatherProfile { pv_kw, ambient_c }
    }

    fn tariff_day(
        &self,
        rng: &mut StdRng,
        day_of_year: u32,
        options: &ForecastOptions,
    ) -> TariffProfile {
        let color = options
            .tempo
            .then(|| Self::tempo_color(rng, day_of_year));
        let factor = color.map_or(1.0, |c| c.price_multiplier());
        let import_price = (0..HOURS_PER_DAY)
            .map(|h| {
                let base = if (PEAK_HOURS.0..PEAK_HOURS.1).contains(&h) {
                    options.peak_price
                } else {
                    options.offpeak_price
                };
                base * factor
            })
            .collect();
        TariffProfile {
            import_price,
            export_price: vec![options.export_price; HOURS_PER_DAY],
            color,
        }
    }

    /// Hourly household consumption with morning and evening peaks (kW).
    pub fn base_load_profile(options: &ForecastOptions) -> Vec<f64> {
        let base = options.base_load_kw;
        let peak = options.peak_load_kw.max(base);
        (0..HOURS_PER_DAY)
            .map(|h| match h {
                7 | 8 => base + 0.6 * (peak - base),
                12 | 13 => base + 0.4 * (peak - base),
                18..=21 => peak,
                6 | 9..=11 | 14..=17 | 22 => base + 0.2 * (peak - base),
                _ => base,
            })
            .collect()
    }

    /// Hourly hot-water draw spreading `daily_kwh` over a morning shower
    /// and evening use (kWh thermal per hour).
    pub fn draw_profile(daily_kwh: f64) -> Vec<f64> {
        let mut draw = vec![0.0; HOURS_PER_DAY];
        let daily_kwh = daily_kwh.max(0.0);
        draw[7] = 0.35 * daily_kwh;
        draw[12] = 0.1 * daily_kwh;
        draw[19] = 0.3 * daily_kwh;
        draw[20] = 0.25 * daily_kwh;
        draw
    }
}

impl ForecastProvider for SyntheticForecast {
    fn weekly_forecast(
        &self,
        start_day: u32,
        options: &ForecastOptions,
    ) -> Result<WeeklyForecast, SimError> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ u64::from(start_day));
        let mut multiplier = 1.0;
        let mut weather = Vec::with_capacity(DAYS_PER_WEEK);
        let mut tariffs = Vec::with_capacity(DAYS_PER_WEEK);
        for d in 0..DAYS_PER_WEEK as u32 {
            let day_of_year = (start_day.max(1) - 1 + d) % 365 + 1;
            weather.push(self.weather_day(&mut rng, &mut multiplier, day_of_year, options));
            tariffs.push(self.tariff_day(&mut rng, day_of_year, options));
        }
        WeeklyForecast::new(start_day, weather, tariffs)
    }
}
