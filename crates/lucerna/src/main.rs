use std::sync::Arc;

use lucerna::{PresentError, RenderHost, frame_perf_log_enabled};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const ORBIT_RADIANS_PER_PIXEL: f32 = 0.005;
const WHEEL_ZOOM_SPEED: f32 = 0.1;
const PIXELS_PER_SCROLL_LINE: f32 = 120.0;
const BOUNCE_DEPTH_KEYS: [(KeyCode, u32); 4] = [
    (KeyCode::Digit1, 1),
    (KeyCode::Digit2, 2),
    (KeyCode::Digit3, 3),
    (KeyCode::Digit4, 4),
];

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    host: Option<RenderHost>,
    is_left_mouse_pressed: bool,
    last_cursor_position: Option<(f64, f64)>,
}

impl App {
    fn window_id(&self) -> Option<WindowId> {
        self.window.as_ref().map(|window| window.id())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.window.is_some() {
            return;
        }

        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title("lucerna")
                        .with_inner_size(PhysicalSize::new(1280u32, 720u32)),
                )
                .expect("create window"),
        );

        let host = pollster::block_on(RenderHost::new(window.clone()));
        window.request_redraw();

        self.window = Some(window);
        self.host = Some(host);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Progressive accumulation keeps refining while the app is idle.
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id() != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let Some(host) = self.host.as_mut() else {
                    return;
                };
                if event.physical_key == PhysicalKey::Code(KeyCode::KeyR) {
                    host.restart_render();
                }
                for (key, bounce_depth) in BOUNCE_DEPTH_KEYS {
                    if event.physical_key == PhysicalKey::Code(key) {
                        host.set_bounce_depth(bounce_depth);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.is_left_mouse_pressed = state == ElementState::Pressed;
                    if let Some(host) = self.host.as_mut() {
                        if self.is_left_mouse_pressed {
                            host.begin_camera_drag();
                        } else {
                            host.end_camera_drag();
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.is_left_mouse_pressed {
                    if let Some((last_x, last_y)) = self.last_cursor_position {
                        let delta_x = (position.x - last_x) as f32;
                        let delta_y = (position.y - last_y) as f32;
                        if let Some(host) = self.host.as_mut() {
                            host.orbit_camera(
                                delta_x * ORBIT_RADIANS_PER_PIXEL,
                                delta_y * ORBIT_RADIANS_PER_PIXEL,
                            );
                        }
                    }
                }
                self.last_cursor_position = Some((position.x, position.y));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_lines = match delta {
                    MouseScrollDelta::LineDelta(_, vertical_lines) => vertical_lines,
                    MouseScrollDelta::PixelDelta(physical_position) => {
                        (physical_position.y as f32) / PIXELS_PER_SCROLL_LINE
                    }
                };
                let zoom_factor = (scroll_lines * WHEEL_ZOOM_SPEED).exp();
                if let Some(host) = self.host.as_mut() {
                    host.zoom_camera(zoom_factor);
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(host) = self.host.as_mut() {
                    host.resize(new_size);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(host) = self.host.as_mut() else {
                    return;
                };
                match host.redraw() {
                    Ok(report) => {
                        if frame_perf_log_enabled() {
                            eprintln!(
                                "[frame] accum={} dynamic={} tiles={} queued={} dispatch_ms={:.3} cpu_ms={:.3}",
                                report.accumulation_frame,
                                host.dynamic_mode(),
                                report.tiles_dispatched,
                                report.tiles_remaining,
                                report.dispatched_ms,
                                report.cpu_frame_ms,
                            );
                        }
                    }
                    Err(PresentError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        if let Some(window) = self.window.as_ref() {
                            let size = window.inner_size();
                            host.resize(size);
                        }
                    }
                    Err(PresentError::Surface(error)) => {
                        eprintln!("[frame] unrecoverable surface error: {error}");
                        event_loop.exit();
                    }
                    Err(PresentError::Dispatch(error)) => {
                        eprintln!("[frame] kernel dispatch failed: {error:?}");
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }
}

fn main() {
    let event_loop = EventLoop::new().expect("create event loop");
    let mut app = App::default();
    event_loop.run_app(&mut app).expect("run event loop");
}
