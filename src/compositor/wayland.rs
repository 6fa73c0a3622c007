//! Wayland Implementation
//!
//! Connects to the compositor, binds the required globals and implements
//! [`Compositor`] on top of `wl_compositor`, `wl_shm` and
//! `zwlr_layer_shell_v1`.
//!
//! # Startup Handshake
//!
//! ```text
//! connect_to_env
//!   └─> get_registry
//!       └─> roundtrip #1   globals announced, required ones bound, outputs bound
//!           └─> check compositor / shm / layer shell present
//!               └─> roundtrip #2   output names, modes, scales arrive
//!                   └─> create surfaces deferred during roundtrip #1
//! ```
//!
//! Event handlers only receive an [`OutputId`] or [`BufferId`] as user data
//! and look the record up in the registry.

use std::os::fd::AsFd;

use tracing::{debug, error, info, trace, warn};
use wayland_client::backend::{ReadEventsGuard, WaylandError};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_compositor::WlCompositor,
    wl_output::{self, WlOutput},
    wl_region::WlRegion,
    wl_registry::{self, WlRegistry},
    wl_shm::{self, WlShm},
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{
    delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum,
};
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::{Layer, ZwlrLayerShellV1},
    zwlr_layer_surface_v1::{self, Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};

use super::{check_version, required_version, Compositor, PixelBuffer, LAYER_NAMESPACE};
use crate::error::{Result, WallpaperError};
use crate::output::{BufferId, OutputId, OutputRegistry};
use crate::shm::{SealedRegion, ShmError, BYTES_PER_PIXEL};

/// The three globals every surface depends on
#[derive(Debug, Default)]
pub struct SessionGlobals {
    compositor: Option<WlCompositor>,
    shm: Option<WlShm>,
    layer_shell: Option<ZwlrLayerShellV1>,
}

impl SessionGlobals {
    /// Fail with the first global the compositor did not announce
    pub fn require(&self) -> Result<()> {
        if self.compositor.is_none() {
            return Err(WallpaperError::MissingGlobal("wl_compositor"));
        }
        if self.shm.is_none() {
            return Err(WallpaperError::MissingGlobal("wl_shm"));
        }
        if self.layer_shell.is_none() {
            return Err(WallpaperError::MissingGlobal("zwlr_layer_shell_v1"));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(layer_shell) = self.layer_shell.take() {
            // destroy was added in v3
            if layer_shell.version() >= 3 {
                layer_shell.destroy();
            }
        }
        self.shm = None;
        self.compositor = None;
    }
}

/// `wl_surface` plus its layer-surface role
#[derive(Debug)]
pub struct LayerSurface {
    surface: WlSurface,
    layer: ZwlrLayerSurfaceV1,
}

/// `wl_buffer` backed by a sealed region
#[derive(Debug)]
pub struct ShmBuffer {
    buffer: WlBuffer,
    region: SealedRegion,
}

impl PixelBuffer for ShmBuffer {
    fn pixels_mut(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }
}

/// [`Compositor`] backed by a live Wayland connection
pub struct WaylandBackend {
    qh: QueueHandle<WaylandState>,
    globals: SessionGlobals,
}

impl Compositor for WaylandBackend {
    type Output = WlOutput;
    type Surface = LayerSurface;
    type Buffer = ShmBuffer;

    fn surfaces_ready(&self) -> bool {
        self.globals.compositor.is_some() && self.globals.layer_shell.is_some()
    }

    fn create_surface(&mut self, id: OutputId, output: &WlOutput) -> Result<LayerSurface> {
        let (Some(compositor), Some(layer_shell)) =
            (&self.globals.compositor, &self.globals.layer_shell)
        else {
            return Err(WallpaperError::SurfaceNotReady);
        };

        let surface = compositor.create_surface(&self.qh, ());

        // Empty input region: pointer events fall through to the desktop
        let input = compositor.create_region(&self.qh, ());
        surface.set_input_region(Some(&input));
        input.destroy();

        let layer = layer_shell.get_layer_surface(
            &surface,
            Some(output),
            Layer::Background,
            LAYER_NAMESPACE.to_string(),
            &self.qh,
            id,
        );
        layer.set_anchor(Anchor::Top | Anchor::Bottom | Anchor::Left | Anchor::Right);
        layer.set_exclusive_zone(-1);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        surface.commit();

        Ok(LayerSurface { surface, layer })
    }

    fn destroy_surface(&mut self, surface: LayerSurface) {
        surface.layer.destroy();
        surface.surface.destroy();
    }

    fn ack_configure(&mut self, surface: &LayerSurface, serial: u32) {
        surface.layer.ack_configure(serial);
    }

    fn commit(&mut self, surface: &LayerSurface) {
        surface.surface.commit();
    }

    fn allocate_buffer(&mut self, id: BufferId, width: u32, height: u32) -> Result<ShmBuffer> {
        let shm = self.globals.shm.as_ref().ok_or(WallpaperError::SurfaceNotReady)?;

        let region = SealedRegion::for_image(c"lamco-wallpaper-buffer", width, height)?;
        let len = i32::try_from(region.len()).map_err(|_| ShmError::PoolTooLarge(region.len()))?;
        let stride = (width as usize * BYTES_PER_PIXEL) as i32;

        let pool = shm.create_pool(region.as_fd(), len, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            stride,
            wl_shm::Format::Xrgb8888,
            &self.qh,
            id,
        );
        pool.destroy();

        trace!("Allocated {}x{} buffer {}", width, height, id.get());
        Ok(ShmBuffer { buffer, region })
    }

    fn attach(
        &mut self,
        surface: &LayerSurface,
        buffer: Option<&ShmBuffer>,
        scale: i32,
        width: u32,
        height: u32,
    ) {
        let wl = &surface.surface;
        match buffer {
            Some(buffer) => {
                wl.set_buffer_scale(scale);
                wl.attach(Some(&buffer.buffer), 0, 0);
                wl.damage_buffer(0, 0, width as i32, height as i32);
            }
            None => wl.attach(None, 0, 0),
        }
        wl.commit();
    }

    fn free_buffer(&mut self, buffer: ShmBuffer) {
        buffer.buffer.destroy();
    }

    fn release_output(&mut self, output: WlOutput) {
        output.release();
    }
}

/// State handed to every Wayland event handler
pub struct WaylandState {
    /// Request side of the session
    pub backend: WaylandBackend,
    /// Monitors and their buffers
    pub outputs: OutputRegistry<WaylandBackend>,
    /// First fatal error raised inside a handler
    pub fatal: Option<WallpaperError>,
}

impl WaylandState {
    fn new(qh: QueueHandle<WaylandState>) -> Self {
        Self {
            backend: WaylandBackend {
                qh,
                globals: SessionGlobals::default(),
            },
            outputs: OutputRegistry::new(),
            fatal: None,
        }
    }

    fn fail(&mut self, err: WallpaperError) {
        error!("{}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    fn on_global(&mut self, registry: &WlRegistry, name: u32, interface: &str, version: u32) {
        let Some(required) = required_version(interface) else {
            return;
        };
        if let Err(e) = check_version(interface, required, version) {
            self.fail(e);
            return;
        }

        let qh = self.backend.qh.clone();
        match interface {
            "wl_compositor" => {
                self.backend.globals.compositor =
                    Some(registry.bind::<WlCompositor, _, _>(name, required, &qh, ()));
            }
            "wl_shm" => {
                self.backend.globals.shm = Some(registry.bind::<WlShm, _, _>(name, required, &qh, ()));
            }
            "zwlr_layer_shell_v1" => {
                self.backend.globals.layer_shell =
                    Some(registry.bind::<ZwlrLayerShellV1, _, _>(name, required, &qh, ()));
            }
            "wl_output" => {
                let id = self.outputs.reserve_id();
                let output = registry.bind::<WlOutput, _, _>(name, required, &qh, id);
                self.outputs.insert(&mut self.backend, id, name, output);
                return;
            }
            _ => return,
        }

        debug!("Bound {} v{}", interface, required);
        self.outputs.create_missing_surfaces(&mut self.backend);
    }
}

impl Dispatch<WlRegistry, ()> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.on_global(registry, name, &interface, version),
            wl_registry::Event::GlobalRemove { name } => {
                state.outputs.remove_global(&mut state.backend, name);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, OutputId> for WaylandState {
    fn event(
        state: &mut Self,
        _output: &WlOutput,
        event: wl_output::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_output::Event::Mode {
                flags: WEnum::Value(flags),
                width,
                height,
                ..
            } if flags.contains(wl_output::Mode::Current) => {
                state.outputs.set_mode(*id, width, height);
            }
            wl_output::Event::Scale { factor } => state.outputs.set_scale(*id, factor),
            wl_output::Event::Name { name } => state.outputs.set_label(*id, name),
            wl_output::Event::Done => state.outputs.done(&mut state.backend, *id),
            _ => {}
        }
    }
}

impl Dispatch<ZwlrLayerSurfaceV1, OutputId> for WaylandState {
    fn event(
        state: &mut Self,
        _layer: &ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => {
                state
                    .outputs
                    .configure(&mut state.backend, *id, serial, width, height);
            }
            zwlr_layer_surface_v1::Event::Closed => state.outputs.closed(&mut state.backend, *id),
            _ => {}
        }
    }
}

impl Dispatch<WlBuffer, BufferId> for WaylandState {
    fn event(
        state: &mut Self,
        _buffer: &WlBuffer,
        event: wl_buffer::Event,
        id: &BufferId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.outputs.buffer_released(&mut state.backend, *id);
        }
    }
}

delegate_noop!(WaylandState: ignore WlCompositor);
delegate_noop!(WaylandState: ignore WlShm);
delegate_noop!(WaylandState: ignore WlRegion);
delegate_noop!(WaylandState: ignore WlShmPool);
delegate_noop!(WaylandState: ignore WlSurface);
delegate_noop!(WaylandState: ignore ZwlrLayerShellV1);

/// Live connection, its event queue and all client-side state
pub struct WaylandSession {
    conn: Connection,
    queue: EventQueue<WaylandState>,
    state: WaylandState,
    _registry: WlRegistry,
}

impl WaylandSession {
    /// Connect to `$WAYLAND_DISPLAY` and request the registry
    pub fn connect() -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| WallpaperError::WaylandConnect(e.to_string()))?;
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let registry = conn.display().get_registry(&qh, ());

        Ok(Self {
            conn,
            queue,
            state: WaylandState::new(qh),
            _registry: registry,
        })
    }

    /// Two-phase startup handshake
    pub fn handshake(&mut self) -> Result<()> {
        self.roundtrip()?;
        self.check_fatal()?;
        self.state.backend.globals.require()?;

        self.roundtrip()?;
        self.check_fatal()?;
        self.state
            .outputs
            .create_missing_surfaces(&mut self.state.backend);

        info!("Wayland session ready with {} output(s)", self.state.outputs.len());
        for output in self.state.outputs.iter() {
            debug!(
                "  {} {:?} {}x{} scale {}",
                output.id(),
                output.label(),
                output.mode().0,
                output.mode().1,
                output.scale()
            );
        }
        Ok(())
    }

    fn roundtrip(&mut self) -> Result<()> {
        self.queue
            .roundtrip(&mut self.state)
            .map(|_| ())
            .map_err(|e| WallpaperError::Protocol(e.to_string()))
    }

    /// Surface a fatal error recorded by a handler
    pub fn check_fatal(&mut self) -> Result<()> {
        match self.state.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run handlers for events already read from the socket
    pub fn dispatch_pending(&mut self) -> Result<usize> {
        self.queue
            .dispatch_pending(&mut self.state)
            .map_err(|e| WallpaperError::Protocol(e.to_string()))
    }

    /// Send queued requests
    ///
    /// A full socket is not an error; the rest goes out on the next flush.
    pub fn flush(&self) -> Result<()> {
        match self.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                warn!("Wayland socket full, deferring flush");
                Ok(())
            }
            Err(e) => Err(WallpaperError::Protocol(e.to_string())),
        }
    }

    /// Start a read; `None` when queued events must be dispatched first
    pub fn prepare_read(&self) -> Option<ReadEventsGuard> {
        self.queue.prepare_read()
    }

    /// Registry and backend, for applying requests
    pub fn parts_mut(&mut self) -> (&mut OutputRegistry<WaylandBackend>, &mut WaylandBackend) {
        (&mut self.state.outputs, &mut self.state.backend)
    }

    /// Destroy every surface, buffer, output and global, then flush
    pub fn shutdown(&mut self) {
        self.state.outputs.shutdown(&mut self.state.backend);
        self.state.backend.globals.teardown();
        if let Err(e) = self.conn.flush() {
            debug!("Final flush failed: {}", e);
        }
    }
}
