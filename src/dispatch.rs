//! Named action dispatch: the typed command surface a device session exposes to callers,
//! independent of whatever wraps it externally (CLI, HTTP handler, program sequencer).

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ActionError, Error};
use crate::firmata::FirmataCodec;
use crate::pin::PinModeId;

/// A single typed argument to an action invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionValue {
    Pin(u8),
    U8(u8),
    Bool(bool),
}

impl ActionValue {
    fn as_pin(&self) -> Result<u8, ()> {
        match self {
            ActionValue::Pin(p) => Ok(*p),
            _ => Err(()),
        }
    }

    fn as_u8(&self) -> Result<u8, ()> {
        match self {
            ActionValue::U8(v) => Ok(*v),
            _ => Err(()),
        }
    }

    fn as_bool(&self) -> Result<bool, ()> {
        match self {
            ActionValue::Bool(v) => Ok(*v),
            _ => Err(()),
        }
    }
}

/// Whatever an action needs to know about the device it runs against: the current value of a
/// pin, so toggling can decide the next state.
pub trait ActionContext {
    fn pin_value(&self, pin: u8) -> Option<u16>;
    fn pin_supports(&self, pin: u8, mode: PinModeId) -> bool;
    /// The pin's currently configured mode, `None` if the pin is unknown.
    fn pin_mode(&self, pin: u8) -> Option<PinModeId>;
    /// Packs `pin` set to `value` into its port's `DIGITAL_MESSAGE` byte, preserving every
    /// sibling pin's last known value.
    fn digital_port_byte(&self, pin: u8, value: bool) -> (u8, u8);
    /// The board's onboard LED pin, used by the parameterless LED built-ins.
    fn led_pin(&self) -> u8;
}

/// Emits `SET_PIN_MODE` ahead of a digital write only when the pin isn't already OUTPUT —
/// matching the device's firmware state instead of re-asserting it on every write.
fn digital_write(ctx: &dyn ActionContext, pin: u8, value: bool) -> Vec<u8> {
    let mut bytes = Vec::new();
    if ctx.pin_mode(pin) != Some(PinModeId::OUTPUT) {
        bytes.extend(FirmataCodec::encode_set_pin_mode(pin, PinModeId::OUTPUT));
    }
    let (port, byte) = ctx.digital_port_byte(pin, value);
    bytes.extend(FirmataCodec::encode_digital_port(port, byte));
    bytes
}

type Handler = Arc<dyn Fn(&[ActionValue], &dyn ActionContext) -> Result<Vec<u8>, Error> + Send + Sync>;

#[derive(Clone)]
struct ActionSpec {
    arity: usize,
    handler: Handler,
}

/// Maps action names to their validation/encoding logic. A fresh [`ActionTable`] carries the
/// four generic built-ins; variant modules (e.g. [`crate::variant::led_controller`]) are
/// dispatched separately by the session, since their encoding doesn't fit this pin-oriented
/// shape.
#[derive(Clone)]
pub struct ActionTable {
    actions: HashMap<String, ActionSpec>,
}

impl Default for ActionTable {
    fn default() -> Self {
        let mut table = Self { actions: HashMap::new() };
        table.register_builtins();
        table
    }
}

impl ActionTable {
    fn register(&mut self, name: &str, arity: usize, handler: Handler) {
        self.actions.insert(name.to_string(), ActionSpec { arity, handler });
    }

    /// Registers the generic, stateless actions every device variant gets. `BLINKON`/
    /// `BLINKOFF` are *not* here: they start/stop a 500ms interval owned by the session
    /// (see [`crate::device::session`]), which this stateless table has no way to express.
    fn register_builtins(&mut self) {
        self.register("TOGGLELED", 0, Arc::new(|_args, ctx| {
            let pin = ctx.led_pin();
            require_output(ctx, pin, "TOGGLELED")?;
            let current = ctx.pin_value(pin).unwrap_or(0);
            Ok(digital_write(ctx, pin, current == 0))
        }));

        self.register("SETPINVALUE", 2, Arc::new(|args, ctx| {
            let pin = args[0].as_pin().map_err(|_| arg_error("SETPINVALUE", "expected a pin as first argument"))?;
            let value = args[1].as_u8().map_err(|_| arg_error("SETPINVALUE", "expected a value as second argument"))?;
            if ctx.pin_supports(pin, PinModeId::PWM) || ctx.pin_supports(pin, PinModeId::SERVO) {
                Ok(FirmataCodec::encode_analog_write(pin, value as u16))
            } else if ctx.pin_supports(pin, PinModeId::OUTPUT) {
                if value > 1 {
                    log::warn!("SETPINVALUE: pin {pin} is digital-only, ignoring non-boolean value {value}");
                    return Ok(Vec::new());
                }
                Ok(digital_write(ctx, pin, value != 0))
            } else {
                Err(ActionError::Malformed {
                    action: "SETPINVALUE".to_string(),
                    reason: format!("pin {pin} does not support output or PWM"),
                }
                .into())
            }
        }));
    }

    /// Encodes `action` with `args` against `ctx`, validating it exists and has the right
    /// arity before running its handler.
    pub fn dispatch(&self, action: &str, args: &[ActionValue], ctx: &dyn ActionContext) -> Result<Vec<u8>, Error> {
        let spec = self.actions.get(action).ok_or_else(|| {
            Error::from(ActionError::Unavailable { action: action.to_string() })
        })?;
        if args.len() != spec.arity {
            return Err(ActionError::Malformed {
                action: action.to_string(),
                reason: format!("expected {} argument(s), got {}", spec.arity, args.len()),
            }
            .into());
        }
        (spec.handler)(args, ctx)
    }

    pub fn is_available(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Names of every stateless action this table handles, plus the session-owned
    /// `BLINKON`/`BLINKOFF` pair that isn't modeled as a table entry (see
    /// [`crate::device::session`]).
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = vec!["BLINKON".to_string(), "BLINKOFF".to_string()];
        names.extend(self.actions.keys().cloned());
        names
    }
}

fn arg_error(action: &str, reason: &str) -> Error {
    ActionError::Malformed { action: action.to_string(), reason: reason.to_string() }.into()
}

/// Parses the raw string params an external caller passes to `executeAction` into typed
/// [`ActionValue`]s, per the action's known argument shape. `SETPINVALUE`'s first argument is
/// a pin, its second an 8-bit value; every other action (including the `LedController`
/// variant's `RAINBOW`/`KITT`/`PULSECOLOR`/`SETCOLOR`, whose hue/saturation/value params must
/// each fit in 8 bits) takes plain 8-bit values. `str::parse::<u8>` rejects both unparseable
/// and out-of-range (>255) input with the same error, which is exactly `ActionMalformed`.
pub fn parse_args(action: &str, raw: &[String]) -> Result<Vec<ActionValue>, Error> {
    match action {
        "SETPINVALUE" => {
            if raw.len() != 2 {
                return Err(arg_error(action, &format!("expected 2 argument(s), got {}", raw.len())));
            }
            let pin = parse_u8(action, &raw[0])?;
            let value = parse_u8(action, &raw[1])?;
            Ok(vec![ActionValue::Pin(pin), ActionValue::U8(value)])
        }
        "TOGGLELED" | "BLINKON" | "BLINKOFF" => {
            if !raw.is_empty() {
                return Err(arg_error(action, "expects no arguments"));
            }
            Ok(Vec::new())
        }
        _ => raw.iter().map(|s| parse_u8(action, s).map(ActionValue::U8)).collect(),
    }
}

fn parse_u8(action: &str, raw: &str) -> Result<u8, Error> {
    raw.parse::<u8>().map_err(|_| arg_error(action, &format!("'{raw}' is not a valid 8-bit value")))
}

fn require_output(ctx: &dyn ActionContext, pin: u8, action: &str) -> Result<(), Error> {
    if ctx.pin_supports(pin, PinModeId::OUTPUT) {
        Ok(())
    } else {
        Err(ActionError::Malformed {
            action: action.to_string(),
            reason: format!("pin {pin} does not support OUTPUT mode"),
        }
        .into())
    }
}
