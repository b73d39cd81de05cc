//! Viewer wiring: window surface, wgpu device, the progressive renderer and
//! its kernel runtime, and the camera whose edits drive the dynamic-mode
//! switches.

pub mod camera;

use std::sync::{Arc, OnceLock};

use camera::OrbitCamera;
use gpu_runtime::TraceKernelRuntime;
use render_protocol::{DispatchError, SurfaceExtent};
use renderer::{FrameReport, ProgressiveRenderer, RenderSettings};
use winit::dpi::PhysicalSize;
use winit::window::Window;

#[derive(Debug)]
pub enum PresentError {
    Surface(wgpu::SurfaceError),
    Dispatch(DispatchError),
}

/// Gate for per-frame scheduling prints; read once from the environment.
pub fn frame_perf_log_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("LUCERNA_PERF_LOG").is_some())
}

pub struct RenderHost {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernel: TraceKernelRuntime,
    renderer: ProgressiveRenderer,
    blitter: wgpu::util::TextureBlitter,
    camera: OrbitCamera,
}

impl RenderHost {
    pub async fn new(window: Arc<Window>) -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("create wgpu surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("request wgpu adapter");

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .expect("request wgpu device");

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .unwrap_or(caps.formats[0]);

        let mut size = window.inner_size();
        size.width = size.width.max(1);
        size.height = size.height.max(1);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let settings = RenderSettings::default();
        let viewport = SurfaceExtent::new(size.width, size.height);
        let kernel = TraceKernelRuntime::new(
            device.clone(),
            queue.clone(),
            viewport,
            settings.resolution_scale,
            settings.bounce_depth,
            settings.light_bounce_depth,
        );
        let renderer = ProgressiveRenderer::new(settings, viewport);
        let blitter = wgpu::util::TextureBlitter::new(&device, surface_config.format);

        Self {
            surface,
            surface_config,
            device,
            queue,
            kernel,
            renderer,
            blitter,
            camera: OrbitCamera::default(),
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface_config.width = new_size.width.max(1);
        self.surface_config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.renderer.resize(
            &mut self.kernel,
            SurfaceExtent::new(new_size.width, new_size.height),
        );
    }

    /// Advance the progressive render by one application frame, then blit
    /// the display target to the swapchain.
    pub fn redraw(&mut self) -> Result<FrameReport, PresentError> {
        let view_params = self.camera.view_params();
        let report = self
            .renderer
            .run_frame(&mut self.kernel, &view_params)
            .map_err(PresentError::Dispatch)?;

        let frame = self
            .surface
            .get_current_texture()
            .map_err(PresentError::Surface)?;
        let target_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lucerna.present.encoder"),
            });
        self.blitter.copy(
            &self.device,
            &mut encoder,
            self.kernel.display_view(),
            &target_view,
        );
        self.queue.submit([encoder.finish()]);
        frame.present();

        Ok(report)
    }

    /// The camera is being grabbed: drop to low-fidelity single-tile
    /// rendering while it moves.
    pub fn begin_camera_drag(&mut self) {
        self.renderer.set_dynamic(&mut self.kernel);
    }

    /// Camera released: restore full quality and start converging again.
    pub fn end_camera_drag(&mut self) {
        self.renderer.set_static(&mut self.kernel);
    }

    pub fn orbit_camera(&mut self, delta_yaw_radians: f32, delta_pitch_radians: f32) {
        self.camera.orbit(delta_yaw_radians, delta_pitch_radians);
        self.renderer.request_reset();
    }

    pub fn zoom_camera(&mut self, factor: f32) {
        self.camera.zoom(factor);
        self.renderer.request_reset();
    }

    pub fn restart_render(&mut self) {
        self.renderer.request_reset();
    }

    pub fn set_bounce_depth(&mut self, bounce_depth: u32) {
        self.renderer.set_bounce_depth(&mut self.kernel, bounce_depth);
    }

    pub fn accumulation_frame(&self) -> u32 {
        self.renderer.accumulation_frame()
    }

    pub fn dynamic_mode(&self) -> bool {
        self.renderer.dynamic_mode()
    }
}
