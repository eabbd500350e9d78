//! Command router
//!
//! Decodes inbound commands into control deltas for the pipeline. Keeps the
//! only authoritative view of the tunable exposure state, updated exclusively
//! by telemetry deltas arriving back over the control channel.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::Command;
use crate::camera::ControlRange;
use crate::control::{keys, ControlMap, ControlSender};

/// Lens position adjustment ratios
const LENS_STEP_UP: f64 = 1.1;
const LENS_STEP_DOWN: f64 = 0.9;

/// Control ranges discovered once at startup, immutable thereafter
#[derive(Debug, Clone)]
pub struct ControlRanges {
    pub gain: ControlRange,
    pub exposure: ControlRange,
    /// Not every sensor has a motorized lens
    pub lens: Option<ControlRange>,
}

#[derive(Debug, Clone, Copy)]
enum Adjust {
    GainUp,
    GainDown,
    ExposureUp,
    ExposureDown,
}

/// The router's view of the device's tunable state
///
/// Gain, exposure and lens position are unknown until the first telemetry
/// delta arrives; relative adjustments are no-ops until then.
#[derive(Debug)]
pub struct ControlState {
    gain: Option<f64>,
    exposure: Option<f64>,
    lens_position: Option<f64>,
    ranges: ControlRanges,
}

impl ControlState {
    pub fn new(ranges: ControlRanges) -> Self {
        Self {
            gain: None,
            exposure: None,
            lens_position: None,
            ranges,
        }
    }

    pub fn gain(&self) -> Option<f64> {
        self.gain
    }

    pub fn exposure(&self) -> Option<f64> {
        self.exposure
    }

    pub fn lens_position(&self) -> Option<f64> {
        self.lens_position
    }

    /// Fold a telemetry delta from the pipeline into the tracked state
    pub fn apply_telemetry(&mut self, delta: &ControlMap) {
        if let Some(gain) = delta.get(keys::ANALOGUE_GAIN).and_then(Value::as_f64) {
            self.gain = Some(gain);
        }
        if let Some(exposure) = delta.get(keys::EXPOSURE_TIME).and_then(Value::as_f64) {
            self.exposure = Some(exposure);
        }
        if let Some(lens) = delta.get(keys::LENS_POSITION).and_then(Value::as_f64) {
            self.lens_position = Some(lens);
        }
    }

    /// Coupled gain/exposure adjustment
    ///
    /// Scales the targeted value by its step factor and clamps it to the
    /// discovered range. When locked, the other value is recomputed so the
    /// gain*exposure product is held constant, then clamped as well. Every
    /// adjustment switches auto exposure and auto white balance off, and the
    /// resulting delta carries the full new state.
    fn scale_exposure(&mut self, adjust: Adjust, locked: bool) -> Option<ControlMap> {
        let (gain, exposure) = match (self.gain, self.exposure) {
            (Some(gain), Some(exposure)) => (gain, exposure),
            // nothing to scale from yet
            _ => return None,
        };

        let gain_step = 2f64.powf(0.1);
        let exposure_step = 2f64.powf(0.2);
        let product = gain * exposure;

        let (mut gain, mut exposure) = (gain, exposure);
        match adjust {
            Adjust::GainUp | Adjust::GainDown => {
                gain = match adjust {
                    Adjust::GainUp => gain * gain_step,
                    _ => gain / gain_step,
                };
                gain = self.ranges.gain.clamp(gain);
                if locked {
                    exposure = self.ranges.exposure.clamp(product / gain);
                }
            }
            Adjust::ExposureUp | Adjust::ExposureDown => {
                exposure = match adjust {
                    Adjust::ExposureUp => exposure * exposure_step,
                    _ => exposure / exposure_step,
                };
                exposure = self.ranges.exposure.clamp(exposure);
                if locked {
                    gain = self.ranges.gain.clamp(product / exposure);
                }
            }
        }

        self.gain = Some(gain);
        self.exposure = Some(exposure);

        let mut delta = ControlMap::new();
        delta.insert(keys::AE_ENABLE.into(), json!(false));
        delta.insert(keys::AWB_ENABLE.into(), json!(false));
        delta.insert(keys::ANALOGUE_GAIN.into(), json!(gain));
        delta.insert(
            keys::EXPOSURE_TIME.into(),
            json!(exposure.round() as i64),
        );
        Some(delta)
    }

    /// Relative lens position adjustment, clamped to the discovered lens
    /// range when the device reports one.
    fn scale_lens(&mut self, ratio: f64) -> Option<ControlMap> {
        let position = self.lens_position?;
        let mut position = position * ratio;
        if let Some(range) = &self.ranges.lens {
            position = range.clamp(position);
        }
        self.lens_position = Some(position);

        let mut delta = ControlMap::new();
        delta.insert(keys::LENS_POSITION.into(), json!(position));
        Some(delta)
    }
}

/// Routes commands to control deltas on the channel toward the pipeline
pub struct CommandRouter {
    state: ControlState,
    to_pipeline: ControlSender,
    over: bool,
}

impl CommandRouter {
    pub fn new(ranges: ControlRanges, to_pipeline: ControlSender) -> Self {
        Self {
            state: ControlState::new(ranges),
            to_pipeline,
            over: false,
        }
    }

    /// Whether a shutdown command has been routed
    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Update the tracked state from a pipeline telemetry delta
    pub fn apply_telemetry(&mut self, delta: &ControlMap) {
        self.state.apply_telemetry(delta);
        debug!(
            gain = ?self.state.gain(),
            exposure = ?self.state.exposure(),
            lens = ?self.state.lens_position(),
            "telemetry update"
        );
    }

    /// Handle one inbound command, emitting zero or one control delta
    pub fn handle(&mut self, command: Command) {
        if self.over {
            return;
        }

        let delta = match command {
            Command::Shutdown => {
                info!("shutdown command received");
                self.over = true;
                let mut delta = ControlMap::new();
                delta.insert(keys::OVER.into(), json!(true));
                Some(delta)
            }
            Command::SetSize { width, height } => {
                let mut delta = ControlMap::new();
                delta.insert(keys::WIDTH.into(), json!(width));
                delta.insert(keys::HEIGHT.into(), json!(height));
                Some(delta)
            }
            // enabling auto exposure re-enables auto white balance as well;
            // the two are coupled in the device
            Command::AutoExposure(enable) => {
                let mut delta = ControlMap::new();
                delta.insert(keys::AE_ENABLE.into(), json!(enable));
                delta.insert(keys::AWB_ENABLE.into(), json!(enable));
                Some(delta)
            }
            Command::AnalogueGainIncrease(lock) => {
                self.state.scale_exposure(Adjust::GainUp, lock.is_locked())
            }
            Command::AnalogueGainDecrease(lock) => self
                .state
                .scale_exposure(Adjust::GainDown, lock.is_locked()),
            Command::ExposureTimeIncrease(lock) => self
                .state
                .scale_exposure(Adjust::ExposureUp, lock.is_locked()),
            Command::ExposureTimeDecrease(lock) => self
                .state
                .scale_exposure(Adjust::ExposureDown, lock.is_locked()),
            Command::AutoFocus(enable) => {
                let mut delta = ControlMap::new();
                delta.insert(keys::AF_ENABLE.into(), json!(enable));
                Some(delta)
            }
            Command::RunAutofocus => {
                let mut delta = ControlMap::new();
                delta.insert(keys::AF_TRIGGER.into(), json!(true));
                Some(delta)
            }
            Command::LensPositionIncrease => self.state.scale_lens(LENS_STEP_UP),
            Command::LensPositionDecrease => self.state.scale_lens(LENS_STEP_DOWN),
            Command::FitScaled => {
                let mut delta = ControlMap::new();
                delta.insert(keys::FIT_MODE.into(), json!("scaled"));
                Some(delta)
            }
            Command::FitCropped => {
                let mut delta = ControlMap::new();
                delta.insert(keys::FIT_MODE.into(), json!("cropped"));
                Some(delta)
            }
        };

        if let Some(delta) = delta {
            self.to_pipeline.send(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExposureLock;
    use crate::control;

    fn ranges() -> ControlRanges {
        ControlRanges {
            gain: ControlRange::new(1.0, 16.0, 1.0),
            exposure: ControlRange::new(100.0, 33000.0, 20000.0),
            lens: Some(ControlRange::new(0.0, 10.0, 1.0)),
        }
    }

    fn telemetry(gain: f64, exposure: f64) -> ControlMap {
        let mut delta = ControlMap::new();
        delta.insert(keys::ANALOGUE_GAIN.into(), json!(gain));
        delta.insert(keys::EXPOSURE_TIME.into(), json!(exposure));
        delta
    }

    fn router() -> (CommandRouter, crate::control::PipelineEndpoint) {
        let (router_ep, pipeline_ep) = control::channel();
        let (tx, _rx) = router_ep.split();
        (CommandRouter::new(ranges(), tx), pipeline_ep)
    }

    #[test]
    fn adjustments_before_telemetry_are_noops() {
        let (mut router, mut pipeline) = router();
        router.handle(Command::AnalogueGainIncrease(ExposureLock::Unlocked));
        router.handle(Command::ExposureTimeDecrease(ExposureLock::Locked));
        router.handle(Command::LensPositionIncrease);
        assert!(pipeline.poll_all().is_empty());
    }

    #[test]
    fn unlocked_gain_increase_matches_worked_example() {
        let (mut router, mut pipeline) = router();
        router.apply_telemetry(&telemetry(4.0, 10000.0));
        router.handle(Command::AnalogueGainIncrease(ExposureLock::Unlocked));

        let deltas = pipeline.poll_all();
        assert_eq!(deltas.len(), 1);
        let delta = &deltas[0];
        assert_eq!(delta[keys::AE_ENABLE], json!(false));
        assert_eq!(delta[keys::AWB_ENABLE], json!(false));
        let gain = delta[keys::ANALOGUE_GAIN].as_f64().unwrap();
        assert!((gain - 4.0 * 2f64.powf(0.1)).abs() < 1e-9);
        assert_eq!(delta[keys::EXPOSURE_TIME], json!(10000));
    }

    #[test]
    fn locked_adjustment_preserves_product() {
        let (mut router, _pipeline) = router();
        router.apply_telemetry(&telemetry(4.0, 10000.0));
        router.handle(Command::AnalogueGainIncrease(ExposureLock::Locked));

        let gain = router.state().gain().unwrap();
        let exposure = router.state().exposure().unwrap();
        assert!((gain * exposure - 40000.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_unlocked_presses_saturate_at_the_range_edges() {
        let (mut router, _pipeline) = router();
        router.apply_telemetry(&telemetry(4.0, 10000.0));

        for _ in 0..200 {
            router.handle(Command::AnalogueGainIncrease(ExposureLock::Unlocked));
            router.handle(Command::ExposureTimeIncrease(ExposureLock::Unlocked));
        }
        assert!((router.state().gain().unwrap() - 16.0).abs() < 1e-9);
        assert!((router.state().exposure().unwrap() - 33000.0).abs() < 1e-9);

        for _ in 0..400 {
            router.handle(Command::AnalogueGainDecrease(ExposureLock::Unlocked));
            router.handle(Command::ExposureTimeDecrease(ExposureLock::Unlocked));
        }
        assert!((router.state().gain().unwrap() - 1.0).abs() < 1e-9);
        assert!((router.state().exposure().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_locked_presses_stay_in_range() {
        // locked steps hold the product, so values oscillate instead of
        // saturating; they must still never leave the ranges
        let (mut router, _pipeline) = router();
        router.apply_telemetry(&telemetry(4.0, 10000.0));

        for _ in 0..200 {
            router.handle(Command::AnalogueGainIncrease(ExposureLock::Locked));
            router.handle(Command::ExposureTimeIncrease(ExposureLock::Locked));
            let gain = router.state().gain().unwrap();
            let exposure = router.state().exposure().unwrap();
            assert!((1.0..=16.0).contains(&gain), "gain escaped: {}", gain);
            assert!(
                (100.0..=33000.0).contains(&exposure),
                "exposure escaped: {}",
                exposure
            );
        }
    }

    #[test]
    fn every_adjustment_stays_clamped() {
        let commands = [
            Command::AnalogueGainIncrease(ExposureLock::Locked),
            Command::AnalogueGainDecrease(ExposureLock::Unlocked),
            Command::ExposureTimeIncrease(ExposureLock::Unlocked),
            Command::ExposureTimeDecrease(ExposureLock::Locked),
        ];
        let (mut router, _pipeline) = router();
        router.apply_telemetry(&telemetry(15.9, 32900.0));

        for step in 0..256 {
            router.handle(commands[step % commands.len()]);
            let gain = router.state().gain().unwrap();
            let exposure = router.state().exposure().unwrap();
            assert!((1.0..=16.0).contains(&gain), "gain escaped: {}", gain);
            assert!(
                (100.0..=33000.0).contains(&exposure),
                "exposure escaped: {}",
                exposure
            );
        }
    }

    #[test]
    fn auto_exposure_couples_white_balance() {
        let (mut router, mut pipeline) = router();
        router.handle(Command::AutoExposure(true));
        let delta = pipeline.poll_all().pop().unwrap();
        assert_eq!(delta[keys::AE_ENABLE], json!(true));
        assert_eq!(delta[keys::AWB_ENABLE], json!(true));

        router.handle(Command::AutoExposure(false));
        let delta = pipeline.poll_all().pop().unwrap();
        assert_eq!(delta[keys::AE_ENABLE], json!(false));
        assert_eq!(delta[keys::AWB_ENABLE], json!(false));
    }

    #[test]
    fn lens_adjustments_scale_and_clamp() {
        let (mut router, mut pipeline) = router();
        let mut delta = ControlMap::new();
        delta.insert(keys::LENS_POSITION.into(), json!(9.5));
        router.apply_telemetry(&delta);

        router.handle(Command::LensPositionIncrease);
        let sent = pipeline.poll_all().pop().unwrap();
        // 9.5 * 1.1 exceeds the lens range and clamps to 10.0
        assert_eq!(sent[keys::LENS_POSITION], json!(10.0));

        router.handle(Command::LensPositionDecrease);
        let sent = pipeline.poll_all().pop().unwrap();
        assert!((sent[keys::LENS_POSITION].as_f64().unwrap() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn set_size_and_fit_modes() {
        let (mut router, mut pipeline) = router();
        router.handle(Command::SetSize {
            width: 800,
            height: 600,
        });
        router.handle(Command::FitCropped);
        let deltas = pipeline.poll_all();
        assert_eq!(deltas[0][keys::WIDTH], json!(800));
        assert_eq!(deltas[0][keys::HEIGHT], json!(600));
        assert_eq!(deltas[1][keys::FIT_MODE], json!("cropped"));
    }

    #[test]
    fn shutdown_emits_over_and_stops_routing() {
        let (mut router, mut pipeline) = router();
        router.handle(Command::Shutdown);
        assert!(router.is_over());
        let delta = pipeline.poll_all().pop().unwrap();
        assert_eq!(delta[keys::OVER], json!(true));

        // no further commands are accepted
        router.handle(Command::FitScaled);
        assert!(pipeline.poll_all().is_empty());
    }
}
