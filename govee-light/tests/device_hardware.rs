//! Integration tests against a real light.
//!
//! These tests require a powered Govee light in range of the first adapter.
//! Run with: GOVEE_TEST_ADDRESS=AA:BB:CC:DD:EE:FF \
//!   cargo test -p govee-light --test device_hardware -- --ignored --nocapture

use std::sync::Arc;
use std::time::Duration;

use govee_light::{LightSession, SessionOptions};
use govee_transport::BtleConnector;

fn test_address() -> String {
    std::env::var("GOVEE_TEST_ADDRESS").expect("set GOVEE_TEST_ADDRESS to the light's address")
}

fn segmented() -> bool {
    std::env::var("GOVEE_TEST_SEGMENTED").is_ok_and(|v| v == "1" || v == "true")
}

async fn open_light() -> LightSession {
    let address = test_address();
    let (connector, _) = BtleConnector::discover(&address, Duration::from_secs(15))
        .await
        .expect("light not found while scanning");
    LightSession::new(
        Arc::new(connector),
        SessionOptions {
            segmented: segmented(),
            ..Default::default()
        },
        None,
    )
}

/// Query power, brightness and color; all three must answer within 5 seconds
#[tokio::test(flavor = "multi_thread")]
#[ignore] // requires hardware
async fn queries_resolve() {
    let light = open_light().await;

    let power = light.request_power_buffered().unwrap();
    let brightness = light.request_brightness_buffered().unwrap();
    let color = light.request_color_buffered().unwrap();
    light.flush().await.unwrap();

    for waiter in [power, brightness, color] {
        let command = waiter.command();
        let state = tokio::time::timeout(Duration::from_secs(5), waiter.wait())
            .await
            .unwrap_or_else(|_| panic!("{} query timed out", command.name()))
            .unwrap();
        println!("{}: {}", command.name(), state);
    }

    light.disconnect().await;
}

/// Toggle power twice and check the confirming responses
#[tokio::test(flavor = "multi_thread")]
#[ignore] // requires hardware
async fn power_toggle_confirms() {
    let light = open_light().await;
    light.refresh().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let original = light.power().unwrap_or(false);

    for on in [!original, original] {
        light.set_power_buffered(on).unwrap();
        let waiter = light.request_power_buffered().unwrap();
        light.flush().await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), waiter.wait())
            .await
            .expect("power query timed out")
            .unwrap();
        assert_eq!(state.power, Some(on));
    }

    light.reset_connection_state().await;
    assert_eq!(light.connection_failure_count(), 0);
}
