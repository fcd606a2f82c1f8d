//! # Light engine
//! This module contains the effect state machine that owns the LED strip:
//! the sunrise brightness/color-temperature ramp, manual control, and the
//! pulse, rainbow and error-blink patterns.
//!
//! Exactly one effect is active at a time. Starting any effect replaces the
//! active effect descriptor in a single assignment under the engine lock;
//! the animation task picks the new descriptor up on its next frame, so a
//! preempted effect never writes again. Strip write failures lower a health
//! flag and nothing else, the state machine keeps advancing without the
//! hardware.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Ticker};
use serde::Serialize;
use smart_leds::RGB8;

use crate::drivers::strip::PixelStrip;

/// Warm white reference, position 0 on the color temperature scale.
pub const WARM_WHITE: RGB8 = RGB8::new(255, 200, 150);

/// Cold white reference, position 100 on the color temperature scale.
pub const COLD_WHITE: RGB8 = RGB8::new(255, 255, 255);

/// Frame period of the animation task.
pub const FRAME_PERIOD: Duration = Duration::from_millis(40);

/// Half-period of the pulse effect in milliseconds.
const PULSE_HALF_PERIOD_MS: u64 = 500;

/// Half-period of the error blink effect in milliseconds.
const ERROR_BLINK_HALF_PERIOD_MS: u64 = 500;

/// Milliseconds per step through the 256-position color wheel.
const RAINBOW_STEP_MS: u64 = 20;

/// The light engine protected by a mutex, shared between the animation
/// task, the scheduler and the request gateway.
pub type SharedLightEngine<S> = Mutex<CriticalSectionRawMutex, LightEngine<S>>;

/// The active effect and the parameters it was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    /// No animation running; the last written values are held.
    Idle,
    /// Sunrise ramp towards `max_brightness` over `duration`.
    Ramping {
        /// When the ramp was started
        started: Instant,
        /// Brightness reached at the end of the ramp (0-100)
        max_brightness: u8,
        /// Total ramp duration
        duration: Duration,
        /// Color temperature held for the whole ramp (0-100)
        color_temp: u8,
    },
    /// On/off square wave at the given brightness and color temperature.
    Pulsing {
        /// When the pulse was started
        started: Instant,
        /// Peak brightness (0-100)
        brightness: u8,
        /// Color temperature (0-100)
        color_temp: u8,
    },
    /// Color wheel rotation across the strip.
    Rainbow {
        /// When the rainbow was started
        started: Instant,
        /// Brightness applied to the wheel colors (0-100)
        brightness: u8,
    },
    /// Red on/off blink signalling a fault to the user.
    ErrorBlink {
        /// When the blink was started
        started: Instant,
    },
}

/// Discriminant of the active effect, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EffectKind {
    /// No animation running
    Idle,
    /// Sunrise ramp in progress
    Ramping,
    /// Pulse pattern running
    Pulsing,
    /// Rainbow pattern running
    Rainbow,
    /// Error blink running
    Error,
}

/// Snapshot of the light state for the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightStatus {
    /// Current brightness (0-100)
    pub brightness: u8,
    /// Current color temperature (0-100)
    pub temperature: u8,
    /// Whether the strip is emitting light
    pub is_on: bool,
    /// The RGB value currently on the strip
    pub rgb: [u8; 3],
}

/// Owns the LED strip and runs one effect at a time against it.
pub struct LightEngine<S: PixelStrip> {
    /// The pixel output capability
    strip: S,
    /// The active effect descriptor
    effect: Effect,
    /// Current brightness (0-100)
    brightness: u8,
    /// Current color temperature (0-100)
    color_temp: u8,
    /// Whether the strip is emitting light
    is_on: bool,
    /// The RGB value last written to the strip
    rgb: RGB8,
    /// False after a strip write failure, true again after a success
    healthy: bool,
}

impl<S: PixelStrip> LightEngine<S> {
    /// Create an engine over `strip` with everything dark and idle.
    pub fn new(strip: S) -> Self {
        let mut engine = Self {
            strip,
            effect: Effect::Idle,
            brightness: 0,
            color_temp: 50,
            is_on: false,
            rgb: RGB8::new(0, 0, 0),
            healthy: true,
        };
        engine.write_uniform(RGB8::new(0, 0, 0));
        engine
    }

    /// Start the sunrise ramp, replacing whatever effect is running.
    ///
    /// Brightness climbs linearly from zero to `max_brightness` over
    /// `duration_minutes` at the fixed `color_temp`. When the ramp
    /// completes the final values are held and the engine goes idle; the
    /// strip stays lit.
    pub fn start_ramp(
        &mut self,
        now: Instant,
        max_brightness: u8,
        duration_minutes: u16,
        color_temp: u8,
    ) {
        info!(
            "starting ramp: max brightness {} over {} min, color temp {}",
            max_brightness, duration_minutes, color_temp
        );
        self.effect = Effect::Ramping {
            started: now,
            max_brightness: max_brightness.min(100),
            duration: Duration::from_secs(u64::from(duration_minutes) * 60),
            color_temp: color_temp.min(100),
        };
        self.tick(now);
    }

    /// Set brightness and color temperature immediately, replacing whatever
    /// effect is running. The engine goes idle.
    pub fn set_manual(&mut self, brightness: u8, color_temp: u8) {
        info!(
            "manual light set: brightness {}, color temp {}",
            brightness, color_temp
        );
        self.effect = Effect::Idle;
        self.apply(brightness.min(100), color_temp.min(100));
    }

    /// Start the pulse pattern, replacing whatever effect is running.
    /// Runs until preempted or stopped.
    pub fn start_pulse(&mut self, now: Instant, brightness: u8, color_temp: u8) {
        info!("starting pulse effect");
        self.effect = Effect::Pulsing {
            started: now,
            brightness: brightness.min(100),
            color_temp: color_temp.min(100),
        };
        self.tick(now);
    }

    /// Start the rainbow pattern, replacing whatever effect is running.
    /// Runs until preempted or stopped.
    pub fn start_rainbow(&mut self, now: Instant, brightness: u8) {
        info!("starting rainbow effect");
        self.effect = Effect::Rainbow {
            started: now,
            brightness: brightness.min(100),
        };
        self.tick(now);
    }

    /// Start the red error blink, replacing whatever effect is running.
    /// Runs until preempted or stopped.
    pub fn start_error_blink(&mut self, now: Instant) {
        warn!("starting error blink");
        self.effect = Effect::ErrorBlink { started: now };
        self.tick(now);
    }

    /// Stop the running effect and turn the strip off.
    pub fn stop(&mut self) {
        info!("stopping light effect");
        self.effect = Effect::Idle;
        self.apply(0, self.color_temp);
    }

    /// Advance the active effect to `now` and write the resulting frame.
    ///
    /// Idle is a no-op: the last written values are held without rewriting
    /// the strip every frame.
    pub fn tick(&mut self, now: Instant) {
        match self.effect {
            Effect::Idle => {}
            Effect::Ramping {
                started,
                max_brightness,
                duration,
                color_temp,
            } => {
                let elapsed = now
                    .checked_duration_since(started)
                    .unwrap_or(Duration::from_ticks(0));
                if elapsed >= duration || duration.as_millis() == 0 {
                    // Terminal: hold the final values, stay lit, go idle.
                    self.effect = Effect::Idle;
                    self.apply(max_brightness, color_temp);
                    info!("ramp complete at brightness {}", max_brightness);
                } else {
                    let brightness = ramp_brightness(elapsed, duration, max_brightness);
                    self.apply(brightness, color_temp);
                }
            }
            Effect::Pulsing {
                started,
                brightness,
                color_temp,
            } => {
                let elapsed_ms = elapsed_millis(now, started);
                let lit = (elapsed_ms / PULSE_HALF_PERIOD_MS) % 2 == 0;
                self.apply(if lit { brightness } else { 0 }, color_temp);
            }
            Effect::Rainbow { started, brightness } => {
                let elapsed_ms = elapsed_millis(now, started);
                #[allow(clippy::cast_possible_truncation)]
                let step = ((elapsed_ms / RAINBOW_STEP_MS) % 256) as u8;
                self.write_rainbow(step, brightness);
            }
            Effect::ErrorBlink { started } => {
                let elapsed_ms = elapsed_millis(now, started);
                let lit = (elapsed_ms / ERROR_BLINK_HALF_PERIOD_MS) % 2 == 0;
                let color = if lit {
                    RGB8::new(255, 0, 0)
                } else {
                    RGB8::new(0, 0, 0)
                };
                self.rgb = color;
                self.is_on = lit;
                self.write_uniform(color);
            }
        }
    }

    /// The active effect discriminant.
    pub const fn effect_kind(&self) -> EffectKind {
        match self.effect {
            Effect::Idle => EffectKind::Idle,
            Effect::Ramping { .. } => EffectKind::Ramping,
            Effect::Pulsing { .. } => EffectKind::Pulsing,
            Effect::Rainbow { .. } => EffectKind::Rainbow,
            Effect::ErrorBlink { .. } => EffectKind::Error,
        }
    }

    /// Current brightness (0-100).
    pub const fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Current color temperature (0-100).
    pub const fn color_temp(&self) -> u8 {
        self.color_temp
    }

    /// Whether the strip is emitting light.
    pub const fn is_on(&self) -> bool {
        self.is_on
    }

    /// The RGB value last written to the strip.
    pub const fn rgb(&self) -> RGB8 {
        self.rgb
    }

    /// False while the most recent strip write has failed.
    pub const fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Snapshot for the control surface.
    pub const fn status(&self) -> LightStatus {
        LightStatus {
            brightness: self.brightness,
            temperature: self.color_temp,
            is_on: self.is_on,
            rgb: [self.rgb.r, self.rgb.g, self.rgb.b],
        }
    }

    /// Recompute the output color from `brightness` and `color_temp`,
    /// update the state and write the frame.
    fn apply(&mut self, brightness: u8, color_temp: u8) {
        self.brightness = brightness;
        self.color_temp = color_temp;
        self.is_on = brightness > 0;
        self.rgb = apply_brightness(cct_to_rgb(color_temp), brightness);
        self.write_uniform(self.rgb);
    }

    /// Write one color to every pixel and show the frame.
    fn write_uniform(&mut self, color: RGB8) {
        for i in 0..self.strip.len() {
            self.strip.set_pixel(i, color);
        }
        self.show();
    }

    /// Write the rainbow gradient rotated by `step` and show the frame.
    fn write_rainbow(&mut self, step: u8, brightness: u8) {
        let count = self.strip.len();
        for i in 0..count {
            #[allow(clippy::cast_possible_truncation)]
            let base_offset = ((i * 256) / count) as u8;
            let color = apply_brightness(wheel(base_offset.wrapping_add(step)), brightness);
            self.strip.set_pixel(i, color);
        }
        self.rgb = apply_brightness(wheel(step), brightness);
        self.is_on = brightness > 0;
        self.brightness = brightness;
        self.show();
    }

    /// Push the frame, folding the outcome into the health flag.
    fn show(&mut self) {
        match self.strip.show() {
            Ok(()) => self.healthy = true,
            Err(_) => {
                if self.healthy {
                    warn!("pixel strip write failed, continuing without hardware");
                }
                self.healthy = false;
            }
        }
    }
}

/// Linear color temperature interpolation between the warm and cold
/// references, 0 = warmest through 100 = coldest.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cct_to_rgb(color_temp: u8) -> RGB8 {
    let t = i32::from(color_temp.min(100));
    let channel = |warm: u8, cold: u8| -> u8 {
        let warm = i32::from(warm);
        let cold = i32::from(cold);
        (warm + (cold - warm) * t / 100) as u8
    };
    RGB8::new(
        channel(WARM_WHITE.r, COLD_WHITE.r),
        channel(WARM_WHITE.g, COLD_WHITE.g),
        channel(WARM_WHITE.b, COLD_WHITE.b),
    )
}

/// Scale a color by a 0-100 brightness.
#[allow(clippy::cast_possible_truncation)]
fn apply_brightness(color: RGB8, brightness: u8) -> RGB8 {
    let b = u16::from(brightness.min(100));
    let scale = |c: u8| -> u8 { (u16::from(c) * b / 100) as u8 };
    RGB8::new(scale(color.r), scale(color.g), scale(color.b))
}

/// Brightness at `elapsed` into a ramp towards `max_brightness`.
fn ramp_brightness(elapsed: Duration, duration: Duration, max_brightness: u8) -> u8 {
    #[allow(clippy::cast_possible_truncation)]
    let value = (elapsed.as_millis() * u64::from(max_brightness) / duration.as_millis()) as u8;
    value.min(max_brightness)
}

/// Function to convert a color wheel value to RGB
pub fn wheel(mut wheel_pos: u8) -> RGB8 {
    wheel_pos = 255 - wheel_pos;
    if wheel_pos < 85 {
        return (255 - wheel_pos * 3, 0, wheel_pos * 3).into();
    }
    if wheel_pos < 170 {
        wheel_pos -= 85;
        return (0, wheel_pos * 3, 255 - wheel_pos * 3).into();
    }
    wheel_pos -= 170;
    (wheel_pos * 3, 255 - wheel_pos * 3, 0).into()
}

/// Milliseconds between `started` and `now`, zero when `now` is earlier.
fn elapsed_millis(now: Instant, started: Instant) -> u64 {
    now.checked_duration_since(started)
        .unwrap_or(Duration::from_ticks(0))
        .as_millis()
}

/// This task advances the active light effect on a fixed frame tick.
/// Effect changes made by the scheduler or the gateway between frames are
/// picked up on the next tick.
pub async fn light_effects_task<S: PixelStrip>(engine: &SharedLightEngine<S>) -> ! {
    info!("light effects task started");
    let mut ticker = Ticker::every(FRAME_PERIOD);
    loop {
        engine.lock().await.tick(Instant::now());
        ticker.next().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::strip::{NullStrip, StripError};

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    const MINUTE_MS: u64 = 60_000;

    #[test]
    fn new_engine_is_dark_and_idle() {
        let engine = LightEngine::new(NullStrip::<8>::new());
        assert_eq!(engine.effect_kind(), EffectKind::Idle);
        assert_eq!(engine.brightness(), 0);
        assert!(!engine.is_on());
        assert!(engine.is_healthy());
    }

    #[test]
    fn color_temperature_interpolates_linearly() {
        assert_eq!(cct_to_rgb(0), WARM_WHITE);
        assert_eq!(cct_to_rgb(100), COLD_WHITE);
        // Midpoint between (255, 200, 150) and (255, 255, 255).
        assert_eq!(cct_to_rgb(50), RGB8::new(255, 227, 202));
    }

    #[test]
    fn ramp_midpoint_matches_expected_values() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_ramp(at(0), 80, 30, 50);
        assert_eq!(engine.effect_kind(), EffectKind::Ramping);
        assert_eq!(engine.brightness(), 0);

        engine.tick(at(15 * MINUTE_MS));
        assert_eq!(engine.brightness(), 40);
        // Warm/cold midpoint (255, 227, 202) scaled by 0.4.
        let rgb = engine.rgb();
        assert!(rgb.r.abs_diff(102) <= 1, "r = {}", rgb.r);
        assert!(rgb.g.abs_diff(90) <= 1, "g = {}", rgb.g);
        assert!(rgb.b.abs_diff(80) <= 1, "b = {}", rgb.b);
        assert!(engine.is_on());
    }

    #[test]
    fn ramp_holds_final_values_and_goes_idle() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_ramp(at(0), 80, 30, 50);

        engine.tick(at(30 * MINUTE_MS));
        assert_eq!(engine.effect_kind(), EffectKind::Idle);
        assert_eq!(engine.brightness(), 80);
        assert!(engine.is_on());
        let held = engine.rgb();

        // No auto-off: later frames change nothing.
        engine.tick(at(90 * MINUTE_MS));
        assert_eq!(engine.brightness(), 80);
        assert_eq!(engine.rgb(), held);
        assert!(engine.is_on());
    }

    #[test]
    fn ramp_frame_reaches_every_pixel() {
        let mut engine = LightEngine::new(NullStrip::<4>::new());
        engine.start_ramp(at(0), 100, 10, 0);
        engine.tick(at(10 * MINUTE_MS));

        let expected = engine.rgb();
        for pixel in engine.strip.frame() {
            assert_eq!(*pixel, expected);
        }
    }

    #[test]
    fn starting_a_second_ramp_cancels_the_first() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_ramp(at(0), 100, 10, 0);
        engine.tick(at(5 * MINUTE_MS));
        assert_eq!(engine.brightness(), 50);

        // Ramp B preempts: from here on only B's trajectory is visible.
        engine.start_ramp(at(5 * MINUTE_MS), 40, 20, 100);
        assert_eq!(engine.brightness(), 0);

        engine.tick(at(15 * MINUTE_MS));
        assert_eq!(engine.brightness(), 20);
        assert_eq!(engine.rgb(), apply_brightness(COLD_WHITE, 20));

        engine.tick(at(25 * MINUTE_MS));
        assert_eq!(engine.effect_kind(), EffectKind::Idle);
        assert_eq!(engine.brightness(), 40);
    }

    #[test]
    fn manual_set_preempts_and_applies_immediately() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_ramp(at(0), 100, 30, 50);
        engine.tick(at(MINUTE_MS));

        engine.set_manual(60, 0);
        assert_eq!(engine.effect_kind(), EffectKind::Idle);
        assert_eq!(engine.brightness(), 60);
        assert_eq!(engine.color_temp(), 0);
        assert!(engine.is_on());
        assert_eq!(engine.rgb(), apply_brightness(WARM_WHITE, 60));

        engine.set_manual(0, 50);
        assert!(!engine.is_on());
        assert_eq!(engine.rgb(), RGB8::new(0, 0, 0));
    }

    #[test]
    fn pulse_alternates_on_and_off() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_pulse(at(0), 70, 50);
        assert_eq!(engine.effect_kind(), EffectKind::Pulsing);
        assert!(engine.is_on());
        assert_eq!(engine.brightness(), 70);

        engine.tick(at(PULSE_HALF_PERIOD_MS));
        assert!(!engine.is_on());
        assert_eq!(engine.brightness(), 0);

        engine.tick(at(2 * PULSE_HALF_PERIOD_MS));
        assert!(engine.is_on());
        assert_eq!(engine.brightness(), 70);

        // Runs until preempted.
        engine.tick(at(100 * PULSE_HALF_PERIOD_MS));
        assert_eq!(engine.effect_kind(), EffectKind::Pulsing);
    }

    #[test]
    fn error_blink_flashes_red() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_error_blink(at(0));
        assert_eq!(engine.effect_kind(), EffectKind::Error);
        assert_eq!(engine.rgb(), RGB8::new(255, 0, 0));
        assert!(engine.is_on());

        engine.tick(at(ERROR_BLINK_HALF_PERIOD_MS));
        assert_eq!(engine.rgb(), RGB8::new(0, 0, 0));
        assert!(!engine.is_on());
    }

    #[test]
    fn rainbow_cycles_colors_over_time() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_rainbow(at(0), 50);
        assert_eq!(engine.effect_kind(), EffectKind::Rainbow);
        let first = engine.rgb();

        engine.tick(at(64 * RAINBOW_STEP_MS));
        assert_ne!(engine.rgb(), first);

        // One full wheel revolution repeats the frame.
        engine.tick(at(256 * RAINBOW_STEP_MS));
        assert_eq!(engine.rgb(), first);
    }

    #[test]
    fn stop_turns_the_strip_off() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.start_rainbow(at(0), 80);
        engine.stop();
        assert_eq!(engine.effect_kind(), EffectKind::Idle);
        assert!(!engine.is_on());
        assert_eq!(engine.rgb(), RGB8::new(0, 0, 0));
    }

    /// Strip whose writes always fail.
    struct BrokenStrip;

    impl PixelStrip for BrokenStrip {
        fn len(&self) -> usize {
            8
        }

        fn set_pixel(&mut self, _index: usize, _color: RGB8) {}

        fn show(&mut self) -> Result<(), StripError> {
            Err(StripError)
        }
    }

    #[test]
    fn write_failure_lowers_health_but_state_advances() {
        let mut engine = LightEngine::new(BrokenStrip);
        assert!(!engine.is_healthy());

        engine.start_ramp(at(0), 80, 30, 50);
        engine.tick(at(15 * MINUTE_MS));

        // The state machine is unaffected by the dead hardware.
        assert_eq!(engine.brightness(), 40);
        assert_eq!(engine.effect_kind(), EffectKind::Ramping);
        assert!(!engine.is_healthy());
    }

    #[test]
    fn status_projects_current_state() {
        let mut engine = LightEngine::new(NullStrip::<8>::new());
        engine.set_manual(80, 50);

        let status = engine.status();
        assert_eq!(status.brightness, 80);
        assert_eq!(status.temperature, 50);
        assert!(status.is_on);
        let rgb = engine.rgb();
        assert_eq!(status.rgb, [rgb.r, rgb.g, rgb.b]);
    }
}
