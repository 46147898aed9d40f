//! Deep sleep, ext0 wake and the system timer

use std::time::Duration;

use beacon_mcu::{BootReason, Clock, Level, PowerControl, WakeSource};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::sys::{self, esp, EspError};
use log::*;

pub struct EspPower;

impl PowerControl for EspPower {
    type Error = EspError;

    fn boot_reason(&self) -> BootReason {
        #[allow(non_upper_case_globals)]
        match unsafe { sys::esp_reset_reason() } {
            sys::esp_reset_reason_t_ESP_RST_POWERON => BootReason::PowerOn,
            sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP => BootReason::WakeFromOff,
            sys::esp_reset_reason_t_ESP_RST_SW
            | sys::esp_reset_reason_t_ESP_RST_PANIC
            | sys::esp_reset_reason_t_ESP_RST_INT_WDT
            | sys::esp_reset_reason_t_ESP_RST_TASK_WDT
            | sys::esp_reset_reason_t_ESP_RST_WDT
            | sys::esp_reset_reason_t_ESP_RST_BROWNOUT
            | sys::esp_reset_reason_t_ESP_RST_EXT => BootReason::Reset,
            other => {
                warn!("Unrecognised reset reason {}", other);
                BootReason::Unknown
            }
        }
    }

    fn configure_wake_source(&mut self, source: WakeSource) -> Result<(), EspError> {
        let WakeSource::Pin { gpio, level } = source;
        let gpio = gpio as sys::gpio_num_t;

        // Hold the pin at its idle level so it does not float during sleep
        match level {
            Level::Low => {
                esp!(unsafe { sys::rtc_gpio_pullup_en(gpio) })?;
                esp!(unsafe { sys::rtc_gpio_pulldown_dis(gpio) })?;
            }
            Level::High => {
                esp!(unsafe { sys::rtc_gpio_pulldown_en(gpio) })?;
                esp!(unsafe { sys::rtc_gpio_pullup_dis(gpio) })?;
            }
        }

        let level = match level {
            Level::Low => 0,
            Level::High => 1,
        };
        esp!(unsafe { sys::esp_sleep_enable_ext0_wakeup(gpio, level) })?;
        info!("Wake armed on GPIO{} level {}", gpio, level);
        Ok(())
    }

    fn power_off(&mut self) -> EspError {
        info!("Entering deep sleep");
        // Only returns when the sleep request was rejected
        let code = unsafe { sys::esp_deep_sleep_try_to_start() };
        EspError::from(code).unwrap_or_else(EspError::from_infallible::<{ sys::ESP_FAIL }>)
    }
}

/// Time since boot from `esp_timer`; waits yield to FreeRTOS
pub struct EspClock;

impl Clock for EspClock {
    fn now(&self) -> Duration {
        let micros = unsafe { sys::esp_timer_get_time() };
        Duration::from_micros(micros.max(0) as u64)
    }

    fn sleep(&mut self, duration: Duration) {
        FreeRtos::delay_ms(duration.as_millis().min(u32::MAX as u128) as u32);
    }
}
