//! Attribute-chaining proxy (spec §4.4 "The proxy", §9 "Attribute-chaining
//! proxy"). Rust has no runtime attribute interception, so chaining is an
//! explicit builder: `proxy.attr("orders").attr("create")` accumulates a
//! dotted name, and `invoke` is what actually sends a `Call`.

use std::sync::Arc;

use dirt_core::{Args, Call, CallFlags, CallOutcome, ClientBinding, DirtError, KwArgs, RemoteAddress, Result, Value};

/// Keys recognised as call-flag markers rather than ordinary kwargs, per
/// the spec's "leading marker" convention (`_can_retry=False`).
const FLAG_MARKER_PREFIX: char = '_';

#[derive(Clone)]
pub struct Proxy {
    client: Arc<dyn ClientBinding>,
    address: RemoteAddress,
    prefix: String,
}

impl Proxy {
    pub fn new(client: Arc<dyn ClientBinding>, address: RemoteAddress) -> Self {
        Self {
            client,
            address,
            prefix: String::new(),
        }
    }

    /// Attribute access: returns a new handle whose prefix is
    /// `prefix + "." + attr`, or just `attr` if this handle's prefix is
    /// empty (spec §3 "Proxy handle").
    pub fn attr(&self, attr: impl AsRef<str>) -> Self {
        let attr = attr.as_ref();
        let prefix = if self.prefix.is_empty() {
            attr.to_string()
        } else {
            format!("{}.{}", self.prefix, attr)
        };
        Self {
            client: self.client.clone(),
            address: self.address.clone(),
            prefix,
        }
    }

    /// Invokes the call this handle's prefix names. `kwargs` may contain
    /// flag markers (`_want_response`, `_can_retry`) which are split out
    /// before the remaining kwargs are sent on the wire.
    pub async fn invoke(&self, args: Args, kwargs: KwArgs) -> Result<CallOutcome> {
        if self.prefix.is_empty() {
            return Err(DirtError::configuration("an empty-prefix proxy handle cannot be invoked"));
        }

        let mut flag_pairs = Vec::new();
        let mut call_kwargs = KwArgs::new();
        for (key, value) in kwargs {
            if let Some(flag_name) = key.strip_prefix(FLAG_MARKER_PREFIX) {
                let flag_value = value.as_bool().ok_or_else(|| {
                    DirtError::configuration(format!("flag `{key}` must be a boolean"))
                })?;
                flag_pairs.push((flag_name.to_string(), flag_value));
            } else {
                call_kwargs.insert(key, value);
            }
        }
        let flags = CallFlags::from_pairs(flag_pairs.iter().map(|(name, value)| (name.as_str(), *value)))?;

        let call = Call::new(self.prefix.clone(), args, call_kwargs, flags)?;
        self.client.call(&self.address, call).await
    }

    /// Convenience for the common case of no args/kwargs/flags.
    pub async fn call0(&self) -> Result<Value> {
        match self.invoke(Vec::new(), KwArgs::new()).await? {
            CallOutcome::Value(value) => Ok(value),
            CallOutcome::Stream(_) => Err(DirtError::protocol("call0 does not support streaming results")),
        }
    }
}
