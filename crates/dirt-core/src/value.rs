use std::collections::BTreeMap;

/// Opaque payload type. The framing layer never inspects it; the default
/// (and, per spec §4.1, project-fixed) codec is JSON, so `serde_json::Value`
/// is the natural choice — it is already a workspace dependency of the
/// teacher and costs nothing extra to carry through the wire layer.
pub type Value = serde_json::Value;

/// Ordered positional arguments.
pub type Args = Vec<Value>;

/// String-keyed arguments. `BTreeMap` (rather than `HashMap`) keeps
/// `kwargs` deterministically ordered, which matters for the `_`-prefixed
/// flag markers the proxy strips out before building a `Call` (spec §4.4).
pub type KwArgs = BTreeMap<String, Value>;
