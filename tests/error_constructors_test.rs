use energy_price_level::error::PriceLevelError;

#[test]
fn error_constructors() {
    assert!(matches!(
        PriceLevelError::config("x"),
        PriceLevelError::Config { .. }
    ));
    assert!(matches!(
        PriceLevelError::validation("f", "m"),
        PriceLevelError::Validation { .. }
    ));
    assert!(matches!(PriceLevelError::io("x"), PriceLevelError::Io { .. }));
    assert!(matches!(
        PriceLevelError::sensor_not_found("sensor.x"),
        PriceLevelError::SensorNotFound { .. }
    ));
    assert!(matches!(
        PriceLevelError::already_configured("energy_price_level_sensor.x"),
        PriceLevelError::AlreadyConfigured { .. }
    ));
    assert!(matches!(
        PriceLevelError::upstream_value_invalid("sensor.x", "unavailable"),
        PriceLevelError::UpstreamValueInvalid { .. }
    ));
}

#[test]
fn update_errors_name_the_source() {
    let e = PriceLevelError::upstream_missing("sensor.nordpool");
    assert_eq!(format!("{}", e), "Source sensor sensor.nordpool not found");

    let e = PriceLevelError::upstream_attributes_missing("sensor.nordpool");
    assert_eq!(
        format!("{}", e),
        "No hourly prices found in source sensor sensor.nordpool attributes"
    );
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let e: PriceLevelError = io.into();
    assert!(matches!(e, PriceLevelError::Io { .. }));
}
