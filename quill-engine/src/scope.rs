//! Variable scopes
//!
//! Scopes live in an arena and refer to their parent by index, so nested
//! blocks never hold references into each other. The arena keeps a cursor on
//! the current frame; entering a block pushes a child frame and leaving it
//! drops that frame again.

use quill_core::Value;
use std::collections::BTreeMap;

/// Parameters a document is rendered with.
pub type Parameters = BTreeMap<String, Value>;

/// Handle to one frame of a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone, Default)]
struct Frame {
    bindings: BTreeMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Arena of variable frames with a cursor on the current one.
#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<Frame>,
    current: ScopeId,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// An empty root scope.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            current: ScopeId::ROOT,
        }
    }

    /// A root scope seeded with parameters.
    pub fn with_parameters(parameters: Parameters) -> Self {
        Self {
            frames: vec![Frame {
                bindings: parameters,
                parent: None,
            }],
            current: ScopeId::ROOT,
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Number of live frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a child of the current frame and make it current.
    pub fn child(&mut self) -> ScopeId {
        let id = ScopeId(self.frames.len());
        self.frames.push(Frame {
            bindings: BTreeMap::new(),
            parent: Some(self.current),
        });
        self.current = id;
        id
    }

    /// Leave `id`, dropping it and every frame created after it.
    ///
    /// The root frame is never dropped.
    pub fn exit(&mut self, id: ScopeId) {
        if id == ScopeId::ROOT || id.0 >= self.frames.len() {
            return;
        }
        self.current = self.frames[id.0].parent.unwrap_or(ScopeId::ROOT);
        self.frames.truncate(id.0);
    }

    /// The frame that binds `name`, searching from the current frame upwards.
    pub fn owner(&self, name: &str) -> Option<ScopeId> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let frame = &self.frames[id.0];
            if frame.bindings.contains_key(name) {
                return Some(id);
            }
            cursor = frame.parent;
        }
        None
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.owner(name).is_some()
    }

    /// Look a name up through the parent chain.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.owner(name)
            .and_then(|id| self.frames[id.0].bindings.get(name))
    }

    /// Like [`Scope::get`], but `undefined` for unbound names.
    pub fn lookup(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let id = self.owner(name)?;
        self.frames[id.0].bindings.get_mut(name)
    }

    /// Assign to the frame that owns `name`, or bind it in the current frame.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let id = self.owner(&name).unwrap_or(self.current);
        self.frames[id.0].bindings.insert(name, value);
    }

    /// Bind `name` in the current frame, shadowing any outer binding.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        let id = self.current;
        self.frames[id.0].bindings.insert(name.into(), value);
    }
}
