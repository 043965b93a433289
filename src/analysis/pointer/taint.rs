//! Taint-analysis configuration and reported taint flows.
//!
//! The taint overlay is driven by three declarative sets:
//! * **sources** — methods whose return value is tainted,
//! * **sinks** — (method, argument index) pairs that must not receive
//!   tainted values,
//! * **transfers** — methods forwarding taint between their arguments,
//!   receiver and result.
//!
//! The sets are read from a JSON file with symbolic method references and
//! resolved against the program once; entries naming unknown classes,
//! methods or types are logged and ignored.

use std::collections::HashSet;
use std::path::Path;

use fnv::FnvHashMap;

use crate::intermediate_representation::{MethodId, Program, StmtRef, Subsignature, Type};
use crate::prelude::*;
use crate::utils::log::LogMessage;

/// The sentinel transfer position denoting the receiver of a call.
pub const BASE: i32 = -1;
/// The sentinel transfer position denoting the result of a call.
pub const RESULT: i32 = -2;

/// A resolved taint transfer: calling the method propagates taint
/// from position `from` to position `to`.
/// Positions are argument indices or one of [`BASE`] and [`RESULT`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct TaintTransfer {
    /// The transferring method.
    pub method: MethodId,
    /// The position taint is read from.
    pub from: i32,
    /// The position taint flows to.
    pub to: i32,
}

/// A detected taint flow: the value produced by the source call site
/// reaches the given argument of the sink call site.
///
/// The derived ordering is total, which keeps reported flow sets stable
/// across runs.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct TaintFlow {
    /// The call site of the taint source.
    pub source_call: StmtRef,
    /// The call site of the sink.
    pub sink_call: StmtRef,
    /// The index of the sink argument that received tainted data.
    pub index: usize,
}

impl std::fmt::Display for TaintFlow {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "taint flow: {} -> {}/{}",
            self.source_call, self.sink_call, self.index
        )
    }
}

/// The resolved taint configuration.
#[derive(Debug, Default)]
pub struct TaintConfig {
    sources: HashSet<(MethodId, Type)>,
    sinks: HashSet<(MethodId, usize)>,
    transfers: FnvHashMap<Subsignature, Vec<TaintTransfer>>,
}

/// The on-disk form of the taint configuration.
#[derive(Serialize, Deserialize, Debug, Default)]
struct RawTaintConfig {
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    sinks: Vec<RawSink>,
    #[serde(default)]
    transfers: Vec<RawTransfer>,
}

#[derive(Serialize, Deserialize, Debug)]
struct RawSource {
    class: String,
    method: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct RawSink {
    class: String,
    method: String,
    index: usize,
}

#[derive(Serialize, Deserialize, Debug)]
struct RawTransfer {
    class: String,
    method: String,
    from: i32,
    to: i32,
}

impl TaintConfig {
    /// The empty configuration: no sources, no sinks, no transfers.
    /// With it, the taint overlay has no observable effect.
    pub fn empty() -> TaintConfig {
        TaintConfig::default()
    }

    /// Read and resolve a configuration from a JSON file.
    pub fn from_json_file(
        program: &Program,
        path: impl AsRef<Path>,
    ) -> Result<(TaintConfig, Vec<LogMessage>), Error> {
        let content = std::fs::read_to_string(path)?;
        let raw: RawTaintConfig = serde_json::from_str(&content)?;
        Ok(Self::resolve(program, raw))
    }

    /// Resolve a configuration from an in-memory JSON value.
    pub fn from_json_value(
        program: &Program,
        value: serde_json::Value,
    ) -> Result<(TaintConfig, Vec<LogMessage>), Error> {
        let raw: RawTaintConfig = serde_json::from_value(value)?;
        Ok(Self::resolve(program, raw))
    }

    fn resolve(program: &Program, raw: RawTaintConfig) -> (TaintConfig, Vec<LogMessage>) {
        let mut config = TaintConfig::empty();
        let mut logs = Vec::new();
        let skip = |what: &str, class: &str, method: &str, logs: &mut Vec<LogMessage>| {
            logs.push(
                LogMessage::new_error(format!(
                    "skipping {what} entry {class}::{method}: not found in the program"
                ))
                .source("taint config"),
            );
        };

        for source in raw.sources {
            let method = program.method_by_signature(&source.class, &source.method);
            let ty = program.type_by_name(&source.ty);
            match (method, ty) {
                (Some(method), Some(ty)) => {
                    config.sources.insert((method, ty));
                }
                _ => skip("source", &source.class, &source.method, &mut logs),
            }
        }
        for sink in raw.sinks {
            match program.method_by_signature(&sink.class, &sink.method) {
                Some(method) => {
                    if sink.index < program.method(method).param_types.len() {
                        config.sinks.insert((method, sink.index));
                    } else {
                        skip("sink", &sink.class, &sink.method, &mut logs);
                    }
                }
                None => skip("sink", &sink.class, &sink.method, &mut logs),
            }
        }
        for transfer in raw.transfers {
            let Some(method) = program.method_by_signature(&transfer.class, &transfer.method)
            else {
                skip("transfer", &transfer.class, &transfer.method, &mut logs);
                continue;
            };
            let param_count = program.method(method).param_types.len() as i32;
            let position_ok = |position: i32| {
                position == BASE || position == RESULT || (0..param_count).contains(&position)
            };
            if !position_ok(transfer.from) || !position_ok(transfer.to) {
                skip("transfer", &transfer.class, &transfer.method, &mut logs);
                continue;
            }
            config
                .transfers
                .entry(program.method(method).subsignature.clone())
                .or_default()
                .push(TaintTransfer {
                    method,
                    from: transfer.from,
                    to: transfer.to,
                });
        }
        (config, logs)
    }

    /// Returns whether the configuration is completely empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.sinks.is_empty() && self.transfers.is_empty()
    }

    /// Returns whether calls to `method` with the given return type
    /// produce tainted data.
    pub fn is_source(&self, method: MethodId, return_type: &Type) -> bool {
        self.sources.contains(&(method, return_type.clone()))
    }

    /// Returns whether the given argument position of `method` is a sink.
    pub fn is_sink(&self, method: MethodId, index: usize) -> bool {
        self.sinks.contains(&(method, index))
    }

    /// The transfers applying to callees with the given subsignature.
    /// Indexed by subsignature so that virtual call sites hit all overrides.
    pub fn transfers_for(&self, subsig: &Subsignature) -> &[TaintTransfer] {
        self.transfers
            .get(subsig)
            .map(|transfers| transfers.as_slice())
            .unwrap_or(&[])
    }
}
