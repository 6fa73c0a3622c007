//! Output registry integration tests
//!
//! Drives the registry through a recording backend, so the frame lifecycle
//! is checked without a running compositor.

use std::collections::HashSet;
use std::os::fd::AsFd;

use lamco_wallpaper::compositor::{Compositor, PixelBuffer};
use lamco_wallpaper::output::{
    BufferId, ConfigureAction, Content, LayerState, OutputId, OutputRegistry,
};
use lamco_wallpaper::scale::ScaleFilter;
use lamco_wallpaper::server::handle_request;
use lamco_wallpaper::shm::{SealedRegion, ShmError};
use lamco_wallpaper::transfer::{RequestHeader, TransferRequest};
use lamco_wallpaper::{Result, WallpaperError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    CreateSurface(OutputId),
    DestroySurface(OutputId),
    Ack(OutputId, u32),
    Commit(OutputId),
    Allocate(BufferId, u32, u32),
    Attach {
        output: OutputId,
        buffer: Option<BufferId>,
        scale: i32,
        first_pixel: Option<[u8; 4]>,
    },
    Free(BufferId),
    ReleaseOutput(u32),
}

struct FakeBuffer {
    id: BufferId,
    pixels: Vec<u8>,
}

impl PixelBuffer for FakeBuffer {
    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

#[derive(Default)]
struct Recorder {
    ready: bool,
    fail_sizes: HashSet<(u32, u32)>,
    events: Vec<Event>,
}

impl Recorder {
    fn ready() -> Self {
        Self {
            ready: true,
            ..Default::default()
        }
    }

    fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn allocations(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, Event::Allocate(..)))
            .count()
    }
}

impl Compositor for Recorder {
    type Output = u32;
    type Surface = OutputId;
    type Buffer = FakeBuffer;

    fn surfaces_ready(&self) -> bool {
        self.ready
    }

    fn create_surface(&mut self, id: OutputId, _output: &u32) -> Result<OutputId> {
        self.events.push(Event::CreateSurface(id));
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: OutputId) {
        self.events.push(Event::DestroySurface(surface));
    }

    fn ack_configure(&mut self, surface: &OutputId, serial: u32) {
        self.events.push(Event::Ack(*surface, serial));
    }

    fn commit(&mut self, surface: &OutputId) {
        self.events.push(Event::Commit(*surface));
    }

    fn allocate_buffer(&mut self, id: BufferId, width: u32, height: u32) -> Result<FakeBuffer> {
        if self.fail_sizes.contains(&(width, height)) {
            return Err(WallpaperError::Shm(ShmError::ZeroSize));
        }
        self.events.push(Event::Allocate(id, width, height));
        Ok(FakeBuffer {
            id,
            pixels: vec![0; (width * height * 4) as usize],
        })
    }

    fn attach(
        &mut self,
        surface: &OutputId,
        buffer: Option<&FakeBuffer>,
        scale: i32,
        _width: u32,
        _height: u32,
    ) {
        self.events.push(Event::Attach {
            output: *surface,
            buffer: buffer.map(|b| b.id),
            scale,
            first_pixel: buffer.map(|b| [b.pixels[0], b.pixels[1], b.pixels[2], b.pixels[3]]),
        });
    }

    fn free_buffer(&mut self, buffer: FakeBuffer) {
        self.events.push(Event::Free(buffer.id));
    }

    fn release_output(&mut self, output: u32) {
        self.events.push(Event::ReleaseOutput(output));
    }
}

/// Announce a named output and complete its configure handshake
fn configured(
    reg: &mut OutputRegistry<Recorder>,
    backend: &mut Recorder,
    global: u32,
    label: &str,
    size: (u32, u32),
) -> OutputId {
    let id = reg.reserve_id();
    reg.insert(backend, id, global, global);
    reg.set_mode(id, size.0 as i32, size.1 as i32);
    reg.set_label(id, label.to_string());
    reg.done(backend, id);
    reg.configure(backend, id, 1, size.0, size.1);
    id
}

fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat((w * h) as usize)
}

fn image(pixels: &[u8], width: u32, height: u32) -> Content<'_> {
    Content::Image {
        pixels,
        width,
        height,
    }
}

#[test]
fn test_draw_all_then_one() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (16, 8));
    let b = configured(&mut reg, &mut backend, 2, "HDMI-A-1", (8, 8));
    backend.take();

    let red = solid(16, 8, [255, 0, 0, 255]);
    let report = reg.apply(&mut backend, None, image(&red, 16, 8), ScaleFilter::default());
    assert_eq!(report.matched, 2);
    assert_eq!(report.drawn, 2);
    let b_frame = reg.get(b).unwrap().current_buffer();
    assert!(b_frame.is_some());

    // Identity size: copied, with red and blue swapped for XRGB8888
    let events = backend.take();
    assert!(events.contains(&Event::Attach {
        output: a,
        buffer: reg.get(a).unwrap().current_buffer(),
        scale: 1,
        first_pixel: Some([0, 0, 255, 255]),
    }));

    let blue = solid(16, 8, [0, 0, 255, 255]);
    let report = reg.apply(
        &mut backend,
        Some("DP-1"),
        image(&blue, 16, 8),
        ScaleFilter::default(),
    );
    assert_eq!(report.matched, 1);
    assert_eq!(report.drawn, 1);
    assert_eq!(reg.get(b).unwrap().current_buffer(), b_frame);

    let events = backend.take();
    assert_eq!(Recorder::allocations(&events), 1);
    assert!(events
        .iter()
        .all(|e| !matches!(e, Event::Attach { output, .. } if *output == b)));
}

#[test]
fn test_repeated_configure_only_recommits() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));

    let px = solid(8, 8, [1, 2, 3, 255]);
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    let frame = reg.get(a).unwrap().current_buffer();
    backend.take();

    let action = reg.configure(&mut backend, a, 7, 8, 8);
    assert_eq!(action, Some(ConfigureAction::Recommit));
    assert_eq!(backend.take(), vec![Event::Ack(a, 7), Event::Commit(a)]);
    assert_eq!(reg.get(a).unwrap().current_buffer(), frame);

    let action = reg.configure(&mut backend, a, 8, 10, 8);
    assert_eq!(
        action,
        Some(ConfigureAction::Resize {
            width: 10,
            height: 8
        })
    );
    assert_eq!(reg.get(a).unwrap().size(), (10, 8));
}

#[test]
fn test_clear_never_scales_and_frees_idle_buffer() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));

    let px = solid(8, 8, [9, 9, 9, 255]);
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    let frame = reg.get(a).unwrap().current_buffer().unwrap();
    reg.buffer_released(&mut backend, frame);
    backend.take();

    let report = reg.apply(&mut backend, None, Content::Clear, ScaleFilter::default());
    assert_eq!(report.cleared, 1);

    let events = backend.take();
    assert_eq!(Recorder::allocations(&events), 0);
    assert_eq!(
        events,
        vec![
            Event::Attach {
                output: a,
                buffer: None,
                scale: 1,
                first_pixel: None
            },
            Event::Commit(a),
            Event::Free(frame),
        ]
    );
    assert!(reg.get(a).unwrap().current_buffer().is_none());
    assert_eq!(reg.buffer_count(), 0);

    // Unmapped until the compositor configures it again
    assert_eq!(reg.get(a).unwrap().state(), LayerState::PendingConfigure);
    let report = reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    assert_eq!(report.skipped, 1);

    reg.configure(&mut backend, a, 3, 8, 8);
    let report = reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    assert_eq!(report.drawn, 1);
}

#[test]
fn test_clear_without_frame_touches_nothing() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    backend.take();

    let report = reg.apply(&mut backend, Some("DP-1"), Content::Clear, ScaleFilter::default());
    assert_eq!(report.cleared, 1);
    assert!(backend.take().is_empty());
    assert!(reg.get(a).unwrap().state().is_drawable());
}

#[test]
fn test_unknown_name_is_a_no_op() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    backend.take();

    let px = solid(4, 4, [0, 0, 0, 255]);
    let report = reg.apply(
        &mut backend,
        Some("VGA-9"),
        image(&px, 4, 4),
        ScaleFilter::default(),
    );
    assert_eq!(report.matched, 0);
    assert!(backend.take().is_empty());
}

#[test]
fn test_failure_on_one_monitor_spares_the_others() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (16, 8));
    let b = configured(&mut reg, &mut backend, 2, "DP-2", (8, 8));
    backend.fail_sizes.insert((16, 8));

    let px = solid(8, 8, [5, 6, 7, 255]);
    let report = reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());

    assert_eq!(report.matched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.drawn, 1);
    assert!(reg.get(a).unwrap().current_buffer().is_none());
    assert!(reg.get(b).unwrap().current_buffer().is_some());
}

#[test]
fn test_unconfigured_monitor_is_skipped() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let id = reg.reserve_id();
    reg.insert(&mut backend, id, 1, 1);
    assert_eq!(reg.get(id).unwrap().state(), LayerState::PendingConfigure);

    let px = solid(4, 4, [0, 0, 0, 255]);
    let report = reg.apply(&mut backend, None, image(&px, 4, 4), ScaleFilter::default());
    assert_eq!(report.skipped, 1);
    assert_eq!(Recorder::allocations(&backend.take()), 0);
}

#[test]
fn test_closed_surface_is_recreated_on_done() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    let px = solid(8, 8, [1, 1, 1, 255]);
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    backend.take();

    reg.closed(&mut backend, a);
    assert_eq!(reg.get(a).unwrap().state(), LayerState::Uncreated);
    assert!(reg.get(a).unwrap().current_buffer().is_none());
    assert_eq!(backend.take(), vec![Event::DestroySurface(a)]);
    // Attached frame was never released, so it waits
    assert_eq!(reg.buffer_count(), 1);

    reg.done(&mut backend, a);
    assert_eq!(backend.take(), vec![Event::CreateSurface(a)]);
    assert_eq!(reg.get(a).unwrap().state(), LayerState::PendingConfigure);

    reg.configure(&mut backend, a, 2, 8, 8);
    assert!(reg.get(a).unwrap().state().is_drawable());
}

#[test]
fn test_removal_releases_in_order() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    let b = configured(&mut reg, &mut backend, 2, "DP-2", (8, 8));
    let px = solid(8, 8, [1, 1, 1, 255]);
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    let frame = reg.get(a).unwrap().current_buffer().unwrap();
    backend.take();

    assert!(reg.remove_global(&mut backend, 1));
    assert_eq!(
        backend.take(),
        vec![Event::DestroySurface(a), Event::ReleaseOutput(1)]
    );
    assert!(reg.get(a).is_none());
    assert_eq!(reg.iter().map(|o| o.id()).collect::<Vec<_>>(), vec![b]);

    // Busy until the compositor lets go of it
    reg.buffer_released(&mut backend, frame);
    assert_eq!(backend.take(), vec![Event::Free(frame)]);

    // Stale callbacks for the removed output resolve to nothing
    assert_eq!(reg.configure(&mut backend, a, 9, 8, 8), None);
    reg.closed(&mut backend, a);
    assert!(backend.take().is_empty());
}

#[test]
fn test_replaced_busy_buffer_waits_for_release() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    let px = solid(8, 8, [1, 1, 1, 255]);

    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    let first = reg.get(a).unwrap().current_buffer().unwrap();
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    let second = reg.get(a).unwrap().current_buffer().unwrap();
    assert_ne!(first, second);
    assert_eq!(reg.buffer_count(), 2);
    assert!(!backend.take().contains(&Event::Free(first)));

    reg.buffer_released(&mut backend, first);
    assert_eq!(backend.take(), vec![Event::Free(first)]);

    // Release of the frame on screen only marks it idle
    reg.buffer_released(&mut backend, second);
    assert!(backend.take().is_empty());
    assert_eq!(reg.buffer_count(), 1);
}

#[test]
fn test_shutdown_frees_everything() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    configured(&mut reg, &mut backend, 1, "DP-1", (8, 8));
    configured(&mut reg, &mut backend, 2, "DP-2", (8, 8));
    let px = solid(8, 8, [1, 1, 1, 255]);
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    reg.apply(&mut backend, None, image(&px, 8, 8), ScaleFilter::default());
    backend.take();

    reg.shutdown(&mut backend);
    let events = backend.take();
    assert!(reg.is_empty());
    assert_eq!(reg.buffer_count(), 0);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::Free(_)))
            .count(),
        4
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::ReleaseOutput(_)))
            .count(),
        2
    );
}

#[test]
fn test_handle_request_maps_sealed_region() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    let a = configured(&mut reg, &mut backend, 1, "DP-1", (4, 4));
    backend.take();

    let mut region = SealedRegion::for_image(c"registry-test", 4, 4).unwrap();
    region
        .as_mut_slice()
        .copy_from_slice(&solid(4, 4, [10, 20, 30, 255]));

    let header = RequestHeader {
        width: 4,
        height: 4,
        name_len: 0,
    };
    let fd = region.as_fd().try_clone_to_owned().unwrap();
    let request = TransferRequest::from_parts(header, Vec::new(), Some(fd)).unwrap();

    let report = handle_request(&mut reg, &mut backend, request, ScaleFilter::Nearest).unwrap();
    assert_eq!(report.drawn, 1);
    assert!(backend.take().contains(&Event::Attach {
        output: a,
        buffer: reg.get(a).unwrap().current_buffer(),
        scale: 1,
        first_pixel: Some([30, 20, 10, 255]),
    }));
}

#[test]
fn test_handle_request_rejects_short_region() {
    let mut backend = Recorder::ready();
    let mut reg = OutputRegistry::new();
    configured(&mut reg, &mut backend, 1, "DP-1", (4, 4));
    backend.take();

    // Region holds 2x2 pixels but the header claims 4x4
    let region = SealedRegion::for_image(c"registry-test", 2, 2).unwrap();
    let header = RequestHeader {
        width: 4,
        height: 4,
        name_len: 0,
    };
    let fd = region.as_fd().try_clone_to_owned().unwrap();
    let request = TransferRequest::from_parts(header, Vec::new(), Some(fd)).unwrap();

    let err = handle_request(&mut reg, &mut backend, request, ScaleFilter::Nearest).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(Recorder::allocations(&backend.take()), 0);
}
