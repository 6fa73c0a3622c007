//! Output Registry
//!
//! Tracks every monitor the compositor announces, owns its layer surface
//! and the buffers attached to it, and applies transfer requests to the
//! monitors they target.
//!
//! # Ownership
//!
//! ```text
//! OutputRegistry
//!   ├─> outputs: OutputId -> Output        (ordered, ids never reused)
//!   │     ├─> handle      (bound wl_output)
//!   │     ├─> surface     (wl_surface + layer surface, while created)
//!   │     └─> current     (BufferId of the displayed frame)
//!   └─> buffers: BufferId -> BufferSlot
//!         └─> busy / retired flags
//! ```
//!
//! Callbacks from the display server carry an [`OutputId`] or [`BufferId`]
//! rather than a reference, so a monitor removed in between simply resolves
//! to nothing.
//!
//! # Buffer Lifetime
//!
//! A buffer is busy from the moment it is attached until the server sends
//! `release`. A buffer that is replaced while busy is marked retired and
//! freed on its release; one that is already idle is freed immediately.
//! `release` of the buffer still on screen only clears its busy flag.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, trace, warn};

use crate::compositor::{Compositor, PixelBuffer};
use crate::scale::{self, ScaleFilter};

pub mod layer;

pub use layer::{ConfigureAction, LayerState};

/// Stable key of a monitor record, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(u64);

impl OutputId {
    /// Raw key value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Key of a display buffer, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    /// Raw key value
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Content a request puts on its target monitors
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    /// Remove the current frame
    Clear,
    /// Cover-scale this RGBA image onto each monitor
    Image {
        /// RGBA pixels, `width * height * 4` bytes
        pixels: &'a [u8],
        /// Source width
        width: u32,
        /// Source height
        height: u32,
    },
}

/// Outcome of applying one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Monitors whose label matched the request
    pub matched: usize,
    /// Monitors that received a new frame
    pub drawn: usize,
    /// Monitors whose frame was removed
    pub cleared: usize,
    /// Matched monitors that are not drawable yet
    pub skipped: usize,
    /// Monitors where allocation or scaling failed
    pub failed: usize,
}

/// One monitor
pub struct Output<C: Compositor> {
    id: OutputId,
    global_name: u32,
    handle: C::Output,
    label: Option<String>,
    mode: (i32, i32),
    scale: i32,
    surface: Option<C::Surface>,
    state: LayerState,
    size: (u32, u32),
    current: Option<BufferId>,
}

impl<C: Compositor> Output<C> {
    /// Registry key
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Name of the `wl_output` global
    pub fn global_name(&self) -> u32 {
        self.global_name
    }

    /// Bound output object
    pub fn handle(&self) -> &C::Output {
        &self.handle
    }

    /// Connector name (e.g. `DP-1`), once announced
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current mode in physical pixels
    pub fn mode(&self) -> (i32, i32) {
        self.mode
    }

    /// Integer scale factor
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Layer-surface state
    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Configured size in surface coordinates
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Buffer currently on screen
    pub fn current_buffer(&self) -> Option<BufferId> {
        self.current
    }

    fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{} ({})", label, self.id),
            None => self.id.to_string(),
        }
    }

    fn matches(&self, target: Option<&str>) -> bool {
        match target {
            None => true,
            Some(name) => self.label.as_deref() == Some(name),
        }
    }

    fn buffer_size(&self) -> (u32, u32) {
        let scale = self.scale.max(1) as u32;
        (self.size.0 * scale, self.size.1 * scale)
    }
}

struct BufferSlot<B> {
    buffer: B,
    owner: OutputId,
    busy: bool,
    retired: bool,
}

/// All monitors and their buffers
pub struct OutputRegistry<C: Compositor> {
    outputs: BTreeMap<OutputId, Output<C>>,
    buffers: HashMap<BufferId, BufferSlot<C::Buffer>>,
    next_output: u64,
    next_buffer: u64,
}

impl<C: Compositor> Default for OutputRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Compositor> OutputRegistry<C> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
            buffers: HashMap::new(),
            next_output: 0,
            next_buffer: 0,
        }
    }

    /// Reserve the key for an output about to be bound
    ///
    /// The key is handed to the bind call as user data so output events can
    /// find their record.
    pub fn reserve_id(&mut self) -> OutputId {
        let id = OutputId(self.next_output);
        self.next_output += 1;
        id
    }

    /// Record a newly bound output and create its surface if possible
    pub fn insert(&mut self, backend: &mut C, id: OutputId, global_name: u32, handle: C::Output) {
        debug!("New output {} (global {})", id, global_name);
        self.outputs.insert(
            id,
            Output {
                id,
                global_name,
                handle,
                label: None,
                mode: (0, 0),
                scale: 1,
                surface: None,
                state: LayerState::Uncreated,
                size: (0, 0),
                current: None,
            },
        );
        self.ensure_surface(backend, id);
    }

    /// Create surfaces for outputs announced before the globals were bound
    pub fn create_missing_surfaces(&mut self, backend: &mut C) {
        let pending: Vec<OutputId> = self
            .outputs
            .values()
            .filter(|o| o.state == LayerState::Uncreated)
            .map(|o| o.id)
            .collect();
        for id in pending {
            self.ensure_surface(backend, id);
        }
    }

    fn ensure_surface(&mut self, backend: &mut C, id: OutputId) {
        if !backend.surfaces_ready() {
            trace!("Deferring surface for {}: globals not bound yet", id);
            return;
        }
        let Some(output) = self.outputs.get_mut(&id) else {
            return;
        };
        if output.state != LayerState::Uncreated {
            return;
        }

        match backend.create_surface(id, &output.handle) {
            Ok(surface) => {
                output.surface = Some(surface);
                output.state = LayerState::PendingConfigure;
                debug!("Created layer surface for {}", output.describe());
            }
            Err(e) => warn!("Failed to create surface for {}: {}", output.describe(), e),
        }
    }

    /// Remove the output bound from global `global_name`
    ///
    /// Returns false when no output came from that global.
    pub fn remove_global(&mut self, backend: &mut C, global_name: u32) -> bool {
        let Some(id) = self.find_global(global_name) else {
            return false;
        };
        let Some(mut output) = self.outputs.remove(&id) else {
            return false;
        };

        info!("Output {} removed", output.describe());
        if let Some(surface) = output.surface.take() {
            backend.destroy_surface(surface);
        }
        if let Some(buffer) = output.current.take() {
            self.retire(backend, buffer);
        }
        backend.release_output(output.handle);
        true
    }

    /// Key of the output bound from global `global_name`
    pub fn find_global(&self, global_name: u32) -> Option<OutputId> {
        self.outputs
            .values()
            .find(|o| o.global_name == global_name)
            .map(|o| o.id)
    }

    /// Merge a `current` mode
    pub fn set_mode(&mut self, id: OutputId, width: i32, height: i32) {
        if let Some(output) = self.outputs.get_mut(&id) {
            output.mode = (width, height);
        }
    }

    /// Merge the integer scale used for the next frame
    pub fn set_scale(&mut self, id: OutputId, scale: i32) {
        if let Some(output) = self.outputs.get_mut(&id) {
            output.scale = scale.max(1);
        }
    }

    /// Merge the connector name
    pub fn set_label(&mut self, id: OutputId, label: String) {
        if let Some(output) = self.outputs.get_mut(&id) {
            output.label = Some(label);
        }
    }

    /// End of an atomic batch of output properties
    ///
    /// Recreates the surface of an output whose layer surface was closed.
    pub fn done(&mut self, backend: &mut C, id: OutputId) {
        if let Some(output) = self.outputs.get(&id) {
            debug!(
                "Output {}: {}x{} scale {}",
                output.describe(),
                output.mode.0,
                output.mode.1,
                output.scale
            );
        }
        self.ensure_surface(backend, id);
    }

    /// Handle a layer-surface configure
    pub fn configure(
        &mut self,
        backend: &mut C,
        id: OutputId,
        serial: u32,
        width: u32,
        height: u32,
    ) -> Option<ConfigureAction> {
        let output = self.outputs.get_mut(&id)?;
        let surface = output.surface.as_ref()?;

        backend.ack_configure(surface, serial);

        let action = output.state.on_configure(output.size, width, height);
        match action {
            ConfigureAction::Recommit => {
                trace!("Configure for {} unchanged, recommitting", output.describe());
                backend.commit(surface);
            }
            ConfigureAction::Resize { width, height } => {
                debug!("Configured {} at {}x{}", output.describe(), width, height);
                output.size = (width, height);
                output.state = LayerState::Drawable;
            }
            ConfigureAction::Ignore => {
                warn!("Ignoring zero-sized configure for {}", output.describe());
            }
        }
        Some(action)
    }

    /// Handle the compositor closing a layer surface
    pub fn closed(&mut self, backend: &mut C, id: OutputId) {
        let Some(output) = self.outputs.get_mut(&id) else {
            return;
        };
        info!("Layer surface for {} closed by compositor", output.describe());

        if let Some(surface) = output.surface.take() {
            backend.destroy_surface(surface);
        }
        output.state = LayerState::Uncreated;
        if let Some(buffer) = output.current.take() {
            self.retire(backend, buffer);
        }
    }

    /// Handle `wl_buffer.release`
    pub fn buffer_released(&mut self, backend: &mut C, id: BufferId) {
        let Some(slot) = self.buffers.get_mut(&id) else {
            return;
        };
        slot.busy = false;
        if slot.retired {
            if let Some(slot) = self.buffers.remove(&id) {
                trace!("Freeing released buffer {} of {}", id.0, slot.owner);
                backend.free_buffer(slot.buffer);
            }
        }
    }

    fn retire(&mut self, backend: &mut C, id: BufferId) {
        let Some(slot) = self.buffers.get_mut(&id) else {
            return;
        };
        if slot.busy {
            slot.retired = true;
        } else if let Some(slot) = self.buffers.remove(&id) {
            backend.free_buffer(slot.buffer);
        }
    }

    /// Apply one transfer request to every monitor it targets
    ///
    /// `target` of `None` selects every monitor, otherwise only monitors
    /// whose label equals it. A failure on one monitor is logged and the
    /// remaining monitors are still updated.
    pub fn apply(
        &mut self,
        backend: &mut C,
        target: Option<&str>,
        content: Content<'_>,
        filter: ScaleFilter,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let targets: Vec<OutputId> = self
            .outputs
            .values()
            .filter(|o| o.matches(target))
            .map(|o| o.id)
            .collect();
        report.matched = targets.len();

        for id in targets {
            match content {
                Content::Clear => {
                    if self.clear_one(backend, id) {
                        report.cleared += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                Content::Image {
                    pixels,
                    width,
                    height,
                } => match self.draw_one(backend, id, pixels, width, height, filter) {
                    Ok(true) => report.drawn += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        let name = self.outputs.get(&id).map(|o| o.describe()).unwrap_or_default();
                        warn!("Failed to draw on {}: {}", name, e);
                        report.failed += 1;
                    }
                },
            }
        }

        if target.is_some() && report.matched == 0 {
            debug!("No output named {:?}", target);
        }
        report
    }

    fn clear_one(&mut self, backend: &mut C, id: OutputId) -> bool {
        let Some(output) = self.outputs.get_mut(&id) else {
            return false;
        };
        let Some(surface) = output.surface.as_ref() else {
            return false;
        };

        let Some(old) = output.current.take() else {
            trace!("Nothing to clear on {}", output.describe());
            return true;
        };

        if output.state.is_drawable() {
            backend.attach(surface, None, output.scale, 0, 0);
            // Unmapped: re-arm with an empty commit and wait for configure
            backend.commit(surface);
            output.state = LayerState::PendingConfigure;
            debug!("Cleared {}", output.describe());
        }
        self.retire(backend, old);
        true
    }

    fn draw_one(
        &mut self,
        backend: &mut C,
        id: OutputId,
        pixels: &[u8],
        width: u32,
        height: u32,
        filter: ScaleFilter,
    ) -> crate::error::Result<bool> {
        let Some(output) = self.outputs.get(&id) else {
            return Ok(false);
        };
        if !output.state.is_drawable() {
            debug!("Skipping {}: not configured yet", output.describe());
            return Ok(false);
        }

        let (bw, bh) = output.buffer_size();
        let buffer_id = BufferId(self.next_buffer);
        self.next_buffer += 1;

        let mut buffer = backend.allocate_buffer(buffer_id, bw, bh)?;
        if let Err(e) = scale::scale(buffer.pixels_mut(), bw, bh, pixels, width, height, filter) {
            backend.free_buffer(buffer);
            return Err(e.into());
        }

        let Some(output) = self.outputs.get_mut(&id) else {
            backend.free_buffer(buffer);
            return Ok(false);
        };
        let Some(surface) = output.surface.as_ref() else {
            backend.free_buffer(buffer);
            return Ok(false);
        };

        backend.attach(surface, Some(&buffer), output.scale, bw, bh);
        let old = output.current.replace(buffer_id);
        trace!("Attached buffer {} ({}x{}) to {}", buffer_id.0, bw, bh, output.describe());

        self.buffers.insert(
            buffer_id,
            BufferSlot {
                buffer,
                owner: id,
                busy: true,
                retired: false,
            },
        );
        if let Some(old) = old {
            self.retire(backend, old);
        }
        Ok(true)
    }

    /// Tear down every surface, buffer and output
    pub fn shutdown(&mut self, backend: &mut C) {
        let outputs = std::mem::take(&mut self.outputs);
        for (_, mut output) in outputs {
            if let Some(surface) = output.surface.take() {
                backend.destroy_surface(surface);
            }
            backend.release_output(output.handle);
        }
        for (_, slot) in self.buffers.drain() {
            backend.free_buffer(slot.buffer);
        }
    }

    /// Output by key
    pub fn get(&self, id: OutputId) -> Option<&Output<C>> {
        self.outputs.get(&id)
    }

    /// Outputs in announcement order
    pub fn iter(&self) -> impl Iterator<Item = &Output<C>> {
        self.outputs.values()
    }

    /// Number of outputs
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether no output is known
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Number of live buffers, attached or awaiting release
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    /// Backend that accepts everything and records nothing
    struct Null {
        ready: bool,
    }

    struct NullBuffer(Vec<u8>);

    impl PixelBuffer for NullBuffer {
        fn pixels_mut(&mut self) -> &mut [u8] {
            &mut self.0
        }
    }

    impl Compositor for Null {
        type Output = ();
        type Surface = ();
        type Buffer = NullBuffer;

        fn surfaces_ready(&self) -> bool {
            self.ready
        }
        fn create_surface(&mut self, _: OutputId, _: &()) -> Result<()> {
            Ok(())
        }
        fn destroy_surface(&mut self, _: ()) {}
        fn ack_configure(&mut self, _: &(), _: u32) {}
        fn commit(&mut self, _: &()) {}
        fn allocate_buffer(&mut self, _: BufferId, w: u32, h: u32) -> Result<NullBuffer> {
            Ok(NullBuffer(vec![0; (w * h * 4) as usize]))
        }
        fn attach(&mut self, _: &(), _: Option<&NullBuffer>, _: i32, _: u32, _: u32) {}
        fn free_buffer(&mut self, _: NullBuffer) {}
        fn release_output(&mut self, _: ()) {}
    }

    fn add(reg: &mut OutputRegistry<Null>, backend: &mut Null, global: u32) -> OutputId {
        let id = reg.reserve_id();
        reg.insert(backend, id, global, ());
        id
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut backend = Null { ready: true };
        let mut reg = OutputRegistry::new();

        let a = add(&mut reg, &mut backend, 10);
        assert!(reg.remove_global(&mut backend, 10));
        let b = add(&mut reg, &mut backend, 10);

        assert_ne!(a, b);
        assert!(reg.get(a).is_none());
        assert!(reg.get(b).is_some());
    }

    #[test]
    fn test_surface_deferred_until_globals_bound() {
        let mut backend = Null { ready: false };
        let mut reg = OutputRegistry::new();
        let id = add(&mut reg, &mut backend, 1);
        assert_eq!(reg.get(id).unwrap().state(), LayerState::Uncreated);

        backend.ready = true;
        reg.create_missing_surfaces(&mut backend);
        assert_eq!(reg.get(id).unwrap().state(), LayerState::PendingConfigure);
    }

    #[test]
    fn test_removal_keeps_order() {
        let mut backend = Null { ready: true };
        let mut reg = OutputRegistry::new();
        let a = add(&mut reg, &mut backend, 1);
        add(&mut reg, &mut backend, 2);
        let c = add(&mut reg, &mut backend, 3);

        reg.remove_global(&mut backend, 2);
        let order: Vec<OutputId> = reg.iter().map(|o| o.id()).collect();
        assert_eq!(order, vec![a, c]);
        assert!(!reg.remove_global(&mut backend, 2));
    }

    #[test]
    fn test_properties_merge_without_drawing() {
        let mut backend = Null { ready: true };
        let mut reg = OutputRegistry::new();
        let id = add(&mut reg, &mut backend, 1);

        reg.set_mode(id, 3840, 2160);
        reg.set_scale(id, 2);
        reg.set_label(id, "eDP-1".into());
        reg.done(&mut backend, id);

        let output = reg.get(id).unwrap();
        assert_eq!(output.mode(), (3840, 2160));
        assert_eq!(output.scale(), 2);
        assert_eq!(output.label(), Some("eDP-1"));
        assert!(output.current_buffer().is_none());
    }

    #[test]
    fn test_buffer_follows_output_scale() {
        let mut backend = Null { ready: true };
        let mut reg = OutputRegistry::new();
        let id = add(&mut reg, &mut backend, 1);
        reg.set_scale(id, 2);
        reg.configure(&mut backend, id, 1, 1920, 1080);

        assert_eq!(reg.get(id).unwrap().buffer_size(), (3840, 2160));
    }
}
