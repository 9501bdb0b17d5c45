use std::time::{Duration, Instant};

use crate::error::{DirtError, Result};
use crate::value::{Args, KwArgs};

/// The closed set of flag names a `Call` may carry. Anything else fails
/// construction (Testable Property 1).
const WANT_RESPONSE: &str = "want_response";
const CAN_RETRY: &str = "can_retry";

/// Per-call behaviour switches.
///
/// # Why
/// The wire protocol needs to know whether to wait for a reply at all
/// (`want_response`, toggled off for `call_ignore`/fire-and-forget), and the
/// client needs to know whether a transport fault on this particular call
/// may be retried (`can_retry` — side-effecting calls the caller can't
/// safely replay set this to `false`).
///
/// # What
/// A closed, validated set: `CallFlags::from_pairs` is the only way to
/// build one from caller-supplied names, and it rejects anything outside
/// `{want_response, can_retry}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFlags {
    want_response: bool,
    can_retry: bool,
}

impl Default for CallFlags {
    fn default() -> Self {
        Self {
            want_response: true,
            can_retry: true,
        }
    }
}

impl CallFlags {
    pub const fn new(want_response: bool, can_retry: bool) -> Self {
        Self {
            want_response,
            can_retry,
        }
    }

    /// Builds flags from `(name, value)` pairs, as the proxy does when it
    /// strips `_want_response=`/`_can_retry=` markers out of the kwargs a
    /// caller passed. Unknown names fail construction rather than being
    /// silently ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, bool)>) -> Result<Self> {
        let mut flags = Self::default();
        for (name, value) in pairs {
            match name {
                WANT_RESPONSE => flags.want_response = value,
                CAN_RETRY => flags.can_retry = value,
                other => {
                    return Err(DirtError::configuration(format!(
                        "unknown call flag `{other}`"
                    )));
                }
            }
        }
        Ok(flags)
    }

    pub fn want_response(&self) -> bool {
        self.want_response
    }

    pub fn can_retry(&self) -> bool {
        self.can_retry
    }
}

/// Mutable observability record attached to a [`Call`]. Everything else
/// about a call is immutable once constructed; this is the one field the
/// edge is allowed to update as the call moves through admission,
/// execution and (for streaming results) iteration.
#[derive(Debug, Clone)]
pub struct CallMeta {
    time_received: Instant,
    time_in_queue: Option<Duration>,
    yielded_items: u64,
}

impl CallMeta {
    pub fn new() -> Self {
        Self {
            time_received: Instant::now(),
            time_in_queue: None,
            yielded_items: 0,
        }
    }

    pub fn time_received(&self) -> Instant {
        self.time_received
    }

    pub fn time_in_queue(&self) -> Option<Duration> {
        self.time_in_queue
    }

    pub fn set_time_in_queue(&mut self, elapsed: Duration) {
        self.time_in_queue = Some(elapsed);
    }

    pub fn yielded_items(&self) -> u64 {
        self.yielded_items
    }

    pub fn record_yield(&mut self) {
        self.yielded_items += 1;
    }

    /// Age since `time_received`, used by `debug.active_calls()`.
    pub fn age(&self) -> Duration {
        self.time_received.elapsed()
    }
}

impl Default for CallMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit of work flowing through the fabric: a dotted method name,
/// positional/keyword arguments, flags, and a mutable `meta` record.
///
/// `name`, `args`, `kwargs` and `flags` are immutable after construction —
/// only `meta` may be mutated, and only by the edge.
#[derive(Debug, Clone)]
pub struct Call {
    name: String,
    args: Args,
    kwargs: KwArgs,
    flags: CallFlags,
    meta: CallMeta,
}

impl Call {
    /// Fails if `name` is empty — every other invariant (flag closure) is
    /// already enforced by [`CallFlags`] before it ever reaches here.
    pub fn new(name: impl Into<String>, args: Args, kwargs: KwArgs, flags: CallFlags) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DirtError::configuration("call name must not be empty"));
        }
        Ok(Self {
            name,
            args,
            kwargs,
            flags,
            meta: CallMeta::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[serde_json::Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &KwArgs {
        &self.kwargs
    }

    pub fn flags(&self) -> CallFlags {
        self.flags
    }

    pub fn meta(&self) -> &CallMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut CallMeta {
        &mut self.meta
    }

    /// Splits the name into the first dotted segment (API selector) and the
    /// remainder (method + optional `.getdoc` suffix), per spec §4.6 step 2.
    pub fn split_name(&self) -> (&str, Option<&str>) {
        match self.name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (&self.name, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_closure_rejects_unknown_names() {
        let err = CallFlags::from_pairs([("bogus", true)]).unwrap_err();
        assert!(matches!(err, DirtError::Configuration(_)));
    }

    #[test]
    fn flag_defaults_are_true_true() {
        let flags = CallFlags::default();
        assert!(flags.want_response());
        assert!(flags.can_retry());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Call::new("", vec![], KwArgs::new(), CallFlags::default()).unwrap_err();
        assert!(matches!(err, DirtError::Configuration(_)));
    }

    #[test]
    fn split_name_separates_api_and_method() {
        let call = Call::new("orders.create", vec![], KwArgs::new(), CallFlags::default()).unwrap();
        assert_eq!(call.split_name(), ("orders", Some("create")));

        let call = Call::new("ping", vec![], KwArgs::new(), CallFlags::default()).unwrap();
        assert_eq!(call.split_name(), ("ping", None));
    }
}
