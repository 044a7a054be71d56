//! Frame-scoped framebuffer snapshots.
//!
//! Two kinds of capture live here: shared snapshots taken once before any
//! component draws (the "initial" buffers) or after each component draws
//! (the "previous" color), and per-component outputs that other components
//! sample by reference (`<component>:color`, `<component>:depth`). Every
//! capture is retired through the recycle bin when the frame ends.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::gl::{GraphicsApi, NO_HANDLE};
use crate::recycle::RecycleBin;

/// Which framebuffer attachment a capture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    Color,
    Depth,
}

impl BufferKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            BufferKind::Color => "color",
            BufferKind::Depth => "depth",
        }
    }
}

/// A reference to another component's rendered output.
///
/// The component part is stored lowercased so references compare
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputKey {
    pub component: String,
    pub kind: BufferKind,
}

impl OutputKey {
    pub fn new(component: &str, kind: BufferKind) -> Self {
        Self {
            component: component.to_lowercase(),
            kind,
        }
    }

    /// Whether `text` looks like an output reference rather than a path.
    pub fn is_reference(text: &str) -> bool {
        text.parse::<OutputKey>().is_ok()
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.kind.suffix())
    }
}

impl FromStr for OutputKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (component, kind) = match lower.rsplit_once(':') {
            Some((component, "color")) => (component, BufferKind::Color),
            Some((component, "depth")) => (component, BufferKind::Depth),
            _ => {
                return Err(EngineError::InvalidDocument(format!(
                    "'{s}' is not a <component>:color or <component>:depth reference"
                )))
            }
        };
        if component.is_empty() {
            return Err(EngineError::InvalidDocument(format!(
                "'{s}' has an empty component identity"
            )));
        }
        Ok(Self {
            component: component.to_string(),
            kind,
        })
    }
}

/// What the registered components need captured this frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameRequirements {
    pub initial_color: bool,
    pub initial_depth: bool,
    pub previous_color: bool,
    pub outputs: BTreeSet<OutputKey>,
}

/// Captured snapshots for the frame in progress.
#[derive(Debug, Default)]
pub struct FrameCache {
    width: u32,
    height: u32,
    initial_color: u32,
    initial_depth: u32,
    previous_color: u32,
    track_previous: bool,
    slots: BTreeMap<OutputKey, u32>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a frame of `width` x `height` pixels.
    ///
    /// Captures the shared initial snapshots the requirements ask for and
    /// registers an empty slot for every referenced output. The returned
    /// scope ends the frame when dropped.
    pub fn begin_frame<'a>(
        &'a mut self,
        api: &dyn GraphicsApi,
        requirements: &FrameRequirements,
        width: u32,
        height: u32,
        bin: &'a mut RecycleBin,
    ) -> FrameScope<'a> {
        self.end_frame(bin);
        self.width = width;
        self.height = height;
        self.track_previous = requirements.previous_color;
        if requirements.initial_color {
            self.initial_color = capture(api, BufferKind::Color, width, height);
        }
        if requirements.initial_depth {
            self.initial_depth = capture(api, BufferKind::Depth, width, height);
        }
        if requirements.previous_color {
            // Before the first component draws, "previous" is the initial state.
            self.previous_color = capture(api, BufferKind::Color, width, height);
        }
        for key in &requirements.outputs {
            self.slots.insert(key.clone(), NO_HANDLE);
        }
        FrameScope { cache: self, bin }
    }

    /// Whether some component samples `key` this frame.
    pub fn is_output_used(&self, key: &OutputKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Captures a finished component's outputs into their registered slots,
    /// then refreshes the previous-color snapshot if anyone samples it.
    pub fn store_outputs(&mut self, api: &dyn GraphicsApi, component: &str, bin: &mut RecycleBin) {
        for kind in [BufferKind::Color, BufferKind::Depth] {
            let key = OutputKey::new(component, kind);
            if let Some(slot) = self.slots.get_mut(&key) {
                bin.add_texture(*slot);
                *slot = capture(api, kind, self.width, self.height);
            }
        }
        if self.track_previous {
            bin.add_texture(self.previous_color);
            self.previous_color = capture(api, BufferKind::Color, self.width, self.height);
        }
    }

    /// The captured texture for `key`, or `0` if it has not been produced.
    pub fn texture(&self, key: &OutputKey) -> u32 {
        self.slots.get(key).copied().unwrap_or(NO_HANDLE)
    }

    pub fn initial(&self, kind: BufferKind) -> u32 {
        match kind {
            BufferKind::Color => self.initial_color,
            BufferKind::Depth => self.initial_depth,
        }
    }

    pub fn previous_color(&self) -> u32 {
        self.previous_color
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Queues every capture of the frame into `bin` and empties the cache.
    pub fn end_frame(&mut self, bin: &mut RecycleBin) {
        for texture in std::mem::take(&mut self.slots).into_values() {
            bin.add_texture(texture);
        }
        bin.add_texture(std::mem::take(&mut self.initial_color));
        bin.add_texture(std::mem::take(&mut self.initial_depth));
        bin.add_texture(std::mem::take(&mut self.previous_color));
        self.track_previous = false;
    }
}

fn capture(api: &dyn GraphicsApi, kind: BufferKind, width: u32, height: u32) -> u32 {
    match api.capture_framebuffer(kind, width, height) {
        Ok(texture) => texture,
        Err(e) => {
            log::warn!("could not capture {} buffer: {e}", kind.suffix());
            NO_HANDLE
        }
    }
}

/// An open frame. Dropping it calls [`FrameCache::end_frame`].
pub struct FrameScope<'a> {
    cache: &'a mut FrameCache,
    bin: &'a mut RecycleBin,
}

impl FrameScope<'_> {
    /// Split access to the cache and the recycle bin for drawing.
    pub fn parts(&mut self) -> (&mut FrameCache, &mut RecycleBin) {
        (&mut *self.cache, &mut *self.bin)
    }
}

impl Deref for FrameScope<'_> {
    type Target = FrameCache;

    fn deref(&self) -> &FrameCache {
        &*self.cache
    }
}

impl DerefMut for FrameScope<'_> {
    fn deref_mut(&mut self) -> &mut FrameCache {
        &mut *self.cache
    }
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        self.cache.end_frame(self.bin);
    }
}
