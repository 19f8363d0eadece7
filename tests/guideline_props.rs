//! Property tests for AQI classification over the built-in table.

use airsight::guideline::{GuidelineTable, Period, Pollutant, AQI_MAX};
use proptest::prelude::*;

fn pollutant() -> impl Strategy<Value = Pollutant> {
    prop_oneof![Just(Pollutant::Pm25), Just(Pollutant::Pm10)]
}

proptest! {
    #[test]
    fn classification_is_total_for_valid_readings(p in pollutant(), value in 0.0f64..5_000.0) {
        let table = GuidelineTable::who_2021().unwrap();
        let index = table.aqi_index(p, value).unwrap();
        prop_assert!(index <= AQI_MAX + 1);
        let band = table.classify(p, value).unwrap();
        prop_assert_eq!(band, table.band_for_index(index));
    }

    #[test]
    fn negative_readings_are_rejected(p in pollutant(), value in -5_000.0f64..-0.001) {
        let table = GuidelineTable::who_2021().unwrap();
        prop_assert!(table.classify(p, value).is_err());
        prop_assert!(table.aqi_index(p, value).is_err());
    }

    #[test]
    fn index_never_decreases_with_concentration(
        p in pollutant(),
        a in 0.0f64..700.0,
        b in 0.0f64..700.0,
    ) {
        let table = GuidelineTable::who_2021().unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(table.aqi_index(p, lo).unwrap() <= table.aqi_index(p, hi).unwrap());
    }

    #[test]
    fn every_index_lands_in_a_containing_band(index in 0u32..=AQI_MAX) {
        let table = GuidelineTable::who_2021().unwrap();
        prop_assert!(table.band_for_index(index).contains(index));
    }

    #[test]
    fn exceedance_matches_daily_limit(p in pollutant(), value in 0.0f64..200.0) {
        let table = GuidelineTable::who_2021().unwrap();
        let limit = table.threshold(p, Period::Daily).unwrap().limit;
        prop_assert_eq!(table.guideline_exceeded(p, Period::Daily, value), value > limit);
    }
}

#[test]
fn non_finite_readings_are_rejected() {
    let table = GuidelineTable::who_2021().unwrap();
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(table.classify(Pollutant::Pm25, value).is_err());
    }
}

#[test]
fn band_bounds_belong_to_their_band() {
    let table = GuidelineTable::who_2021().unwrap();
    for band in table.bands() {
        assert_eq!(table.band_for_index(band.lower_bound), band);
        assert_eq!(table.band_for_index(band.upper_bound), band);
    }
}
