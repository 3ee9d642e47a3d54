//! Platform location backends
//!
//! The browser build asks `navigator.geolocation`. Desktops have no portable
//! location service, so the native build answers from the command line
//! (`--location` / `--location-error`) and reports itself unsupported otherwise.

use crate::app::settings::Settings;
use visit_atlas_lib::{
    LocationApi, LocationOptions, PlatformError, PositionCallback, PositionReading,
};
#[cfg(not(target_arch = "wasm32"))]
use visit_atlas_lib::{Coordinate, PositionErrorCode};

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformLocationApi = StaticLocationApi;

#[cfg(target_arch = "wasm32")]
pub type PlatformLocationApi = BrowserLocationApi;

/// Location backend for the current platform
#[cfg(not(target_arch = "wasm32"))]
pub fn platform_api(settings: &Settings) -> PlatformLocationApi {
    StaticLocationApi::new(settings.location, settings.location_error)
}

#[cfg(target_arch = "wasm32")]
pub fn platform_api(_settings: &Settings) -> PlatformLocationApi {
    BrowserLocationApi
}

/// Answers every request with the same configured reading or error code
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct StaticLocationApi {
    position: Option<Coordinate>,
    error_code: Option<u16>,
}

#[cfg(not(target_arch = "wasm32"))]
impl StaticLocationApi {
    /// Accuracy reported for configured positions
    const ACCURACY_METERS: f64 = 25.0;

    pub fn new(position: Option<Coordinate>, error_code: Option<u16>) -> Self {
        Self {
            position,
            error_code,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LocationApi for StaticLocationApi {
    fn is_supported(&self) -> bool {
        self.position.is_some() || self.error_code.is_some()
    }

    fn current_position(
        &self,
        _options: &LocationOptions,
        callback: PositionCallback,
    ) -> Result<(), PlatformError> {
        if let Some(code) = self.error_code {
            callback(Err(PositionErrorCode(code)));
            return Ok(());
        }
        match self.position {
            Some(position) => {
                callback(Ok(PositionReading {
                    longitude: position.longitude(),
                    latitude: position.latitude(),
                    accuracy_meters: Self::ACCURACY_METERS,
                }));
                Ok(())
            }
            None => Err(PlatformError("no location configured".to_string())),
        }
    }
}

/// `navigator.geolocation.getCurrentPosition`
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserLocationApi;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use visit_atlas_lib::PositionErrorCode;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;

    fn geolocation() -> Result<web_sys::Geolocation, PlatformError> {
        web_sys::window()
            .ok_or_else(|| PlatformError("no window".to_string()))?
            .navigator()
            .geolocation()
            .map_err(|e| PlatformError(format!("geolocation unavailable: {:?}", e)))
    }

    fn number(value: &JsValue, key: &str) -> Option<f64> {
        js_sys::Reflect::get(value, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_f64())
    }

    /// Read a `GeolocationPosition` without binding its web-sys type
    fn read_position(position: &JsValue) -> Result<PositionReading, PositionErrorCode> {
        let coords = js_sys::Reflect::get(position, &JsValue::from_str("coords"))
            .map_err(|_| PositionErrorCode(2))?;
        match (
            number(&coords, "longitude"),
            number(&coords, "latitude"),
            number(&coords, "accuracy"),
        ) {
            (Some(longitude), Some(latitude), accuracy) => Ok(PositionReading {
                longitude,
                latitude,
                accuracy_meters: accuracy.unwrap_or(f64::INFINITY),
            }),
            _ => Err(PositionErrorCode(2)),
        }
    }

    fn read_error_code(error: &JsValue) -> PositionErrorCode {
        PositionErrorCode(number(error, "code").map(|c| c as u16).unwrap_or(0))
    }

    impl LocationApi for BrowserLocationApi {
        fn is_supported(&self) -> bool {
            geolocation().is_ok()
        }

        fn current_position(
            &self,
            options: &LocationOptions,
            callback: PositionCallback,
        ) -> Result<(), PlatformError> {
            let geolocation = geolocation()?;

            // Whichever browser callback runs first consumes the completion
            let shared: Rc<RefCell<Option<PositionCallback>>> = Rc::new(RefCell::new(Some(callback)));

            let on_success = {
                let shared = Rc::clone(&shared);
                Closure::once_into_js(move |position: JsValue| {
                    if let Some(callback) = shared.borrow_mut().take() {
                        callback(read_position(&position));
                    }
                })
            };
            let on_error = {
                let shared = Rc::clone(&shared);
                Closure::once_into_js(move |error: JsValue| {
                    if let Some(callback) = shared.borrow_mut().take() {
                        callback(Err(read_error_code(&error)));
                    }
                })
            };

            let position_options = web_sys::PositionOptions::new();
            position_options.set_enable_high_accuracy(options.enable_high_accuracy);
            position_options.set_timeout(options.timeout.as_millis() as u32);
            position_options.set_maximum_age(options.maximum_age.as_millis() as u32);

            geolocation
                .get_current_position_with_error_callback_and_options(
                    on_success.unchecked_ref(),
                    Some(on_error.unchecked_ref()),
                    &position_options,
                )
                .map_err(|e| PlatformError(format!("getCurrentPosition failed: {:?}", e)))
        }
    }
}
