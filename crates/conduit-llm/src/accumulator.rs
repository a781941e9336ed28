//! Reassembly of tool-call arguments streamed in fragments
//!
//! Vendors deliver tool-call arguments as JSON text split across many
//! stream increments, possibly interleaved across calls. One accumulator
//! is owned by each streaming invocation.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::error::ToolArgumentParseError;
use crate::types::{FunctionCall, Part};

/// Lifecycle of one accumulator slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing received for the index
    Empty,
    /// Fragments are being appended
    Accumulating,
    /// `finalize` has run; the slot no longer accepts fragments
    Finalized,
}

#[derive(Debug, Default)]
struct Slot {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    /// Closing delimiters of the containers currently open
    open: Vec<char>,
    in_string: bool,
    escaped: bool,
    started: bool,
}

impl Slot {
    fn push(&mut self, fragment: &str) {
        self.arguments.push_str(fragment);

        for ch in fragment.chars() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => self.open.push('}'),
                '[' => self.open.push(']'),
                '}' | ']' => {
                    self.open.pop();
                }
                _ => {}
            }

            if !ch.is_whitespace() {
                self.started = true;
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.started && self.open.is_empty() && !self.in_string
    }

    fn parse(&self) -> Result<Map<String, Value>, String> {
        let text = self.arguments.trim();
        if text.is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value) => into_object(value),
            Err(e) if self.in_string => {
                let mut repaired = text.to_owned();
                repaired.push('"');
                repaired.extend(self.open.iter().rev());

                tracing::debug!(name = ?self.name, "closing unterminated string in tool-call arguments");

                serde_json::from_str::<Value>(&repaired)
                    .map_err(|_| e.to_string())
                    .and_then(into_object)
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

/// A tool call whose arguments stream has ended
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedToolCall {
    /// Slot index the call was accumulated in
    pub index: u32,
    /// Call identifier, generated when the vendor sent none
    pub id: String,
    /// Tool name
    pub name: String,
    /// Parsed arguments, or why they could not be parsed
    pub arguments: Result<Map<String, Value>, ToolArgumentParseError>,
}

impl FinalizedToolCall {
    /// Canonical part for this call
    ///
    /// A parse failure yields a degraded call with empty arguments and
    /// `args_error` set, so one bad call never fails the whole response.
    pub fn into_part(self) -> Part {
        let (args, args_error) = match self.arguments {
            Ok(args) => (args, None),
            Err(e) => (Map::new(), Some(e.to_string())),
        };

        Part::FunctionCall(FunctionCall {
            id: self.id,
            name: self.name,
            args,
            args_error,
        })
    }
}

/// Per-stream buffer of tool-call argument fragments keyed by index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, Slot>,
    /// Vendor index to the slot currently receiving its fragments
    routes: HashMap<u32, u32>,
    finalized: bool,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment for the call at `index`
    ///
    /// `id` and `name` are recorded the first time they appear. When a
    /// different id arrives for an index whose arguments already form a
    /// complete JSON value, the vendor has reused the index for a new
    /// call: it gets a fresh slot above every index seen so far, and later
    /// fragments for `index` follow it there. A vendor index first seen
    /// after such a move never shares the moved call's slot. Returns the
    /// slot index the fragment was stored in.
    pub fn add_chunk(&mut self, index: u32, fragment: &str, id: Option<&str>, name: Option<&str>) -> u32 {
        let mut target = match self.routes.get(&index) {
            Some(&slot) => slot,
            None if self.slots.contains_key(&index) => self.fresh_slot(),
            None => index,
        };

        if self.finalized {
            tracing::debug!(index, "ignoring tool-call fragment after finalize");
            return target;
        }

        let id = id.filter(|id| !id.is_empty());
        let name = name.filter(|name| !name.is_empty());

        if let (Some(new_id), Some(slot)) = (id, self.slots.get(&target))
            && slot.id.as_deref().is_some_and(|existing| existing != new_id)
            && slot.is_complete()
        {
            let fresh = self.fresh_slot();
            tracing::debug!(index, moved_to = fresh, "tool-call index reused for a new call");
            target = fresh;
        }

        if target != index {
            tracing::trace!(index, slot = target, "routing tool-call fragment");
        }
        self.routes.insert(index, target);

        let slot = self.slots.entry(target).or_default();

        if slot.id.is_none() {
            slot.id = id.map(ToOwned::to_owned);
        }
        if slot.name.is_none() {
            slot.name = name.map(ToOwned::to_owned);
        }

        slot.push(fragment);
        target
    }

    /// Slot index above every slot and every vendor index seen
    fn fresh_slot(&self) -> u32 {
        let highest_slot = self.slots.keys().next_back().copied();
        let highest_route = self.routes.keys().copied().max();
        highest_slot.max(highest_route).map_or(0, |highest| highest + 1)
    }

    /// Argument text received so far for a slot
    pub fn buffer(&self, index: u32) -> &str {
        self.slots.get(&index).map_or("", |slot| slot.arguments.as_str())
    }

    /// Lifecycle state of a slot
    pub fn state(&self, index: u32) -> SlotState {
        match self.slots.get(&index) {
            None => SlotState::Empty,
            Some(_) if self.finalized => SlotState::Finalized,
            Some(_) => SlotState::Accumulating,
        }
    }

    /// Whether the slot holds a balanced JSON value
    pub fn is_complete(&self, index: u32) -> bool {
        self.slots.get(&index).is_some_and(Slot::is_complete)
    }

    /// Whether no fragment has been received
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Parse every slot, ordered by index
    ///
    /// Empty argument text parses as an empty object. Each call succeeds
    /// or fails on its own.
    pub fn finalize(&mut self) -> Vec<FinalizedToolCall> {
        self.finalized = true;

        self.slots
            .iter()
            .map(|(&index, slot)| {
                let name = slot.name.clone().unwrap_or_default();
                let arguments = slot.parse().map_err(|message| {
                    tracing::warn!(index, name = %name, error = %message, "tool-call arguments failed to parse");
                    ToolArgumentParseError {
                        index,
                        name: name.clone(),
                        raw: slot.arguments.clone(),
                        message,
                    }
                });

                FinalizedToolCall {
                    index,
                    id: slot
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name,
                    arguments,
                }
            })
            .collect()
    }

    /// Drop all state; safe to call any number of times
    pub fn reset(&mut self) {
        self.slots.clear();
        self.routes.clear();
        self.finalized = false;
    }
}
