//! wgpu host for the path-tracing kernel.
//!
//! Owns the compute pipeline, the accumulation buffer, the display storage
//! texture, and the path-vertex buffers whose sizes follow the scaled
//! viewport and the bounce depth. Implements the `TraceKernel` seam: every
//! dispatch is submitted, waited on, and timed here, so the scheduler above
//! only ever sees measured wall-clock durations.

use std::time::{Duration, Instant};

use bytemuck::Zeroable;
use render_protocol::{
    BLOCK_SIZE, BlockRegion, DispatchError, FrameParams, SurfaceExtent, TraceKernel, ViewParams,
};

const WORKGROUP_SIZE: u32 = 16;
const WORKGROUPS_PER_BLOCK_AXIS: u32 = BLOCK_SIZE / WORKGROUP_SIZE;

/// Per-frame uniforms as laid out in `pathtrace.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TraceUniformsGpu {
    camera_origin: [f32; 4],
    camera_forward: [f32; 4],
    camera_right: [f32; 4],
    camera_up: [f32; 4],
    surface_width: u32,
    surface_height: u32,
    frame_index: u32,
    accumulation_frame: u32,
    bounce_depth: u32,
    tile_block_x: u32,
    tile_block_y: u32,
    field_of_view_degrees: f32,
}

/// One record of the path-vertex storage layout; 128 bytes, matching the
/// `PathVertex` struct in `pathtrace.wgsl`. Only its size matters to the
/// host, which uses it to dimension the path buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PathVertexGpu {
    pub surface_position: [f32; 4],
    pub surface_normal: [f32; 4],
    pub surface_colour: [f32; 4],
    pub reflected_dir: [f32; 4],
    pub outgoing_light: [f32; 4],
    pub direct_light: [f32; 4],
    pub surface_roughness: f32,
    pub surface_emission: f32,
    pub ior: f32,
    pub refractive: u32,
    pub hit_sky: u32,
    pub inside: u32,
    pub refracted: u32,
    pub cached_direct_light: u32,
}

struct KernelSurfaces {
    scaled_extent: SurfaceExtent,
    _accumulation_buffer: wgpu::Buffer,
    display_target: wgpu::Texture,
    display_view: wgpu::TextureView,
    _camera_path_buffer: wgpu::Buffer,
    _light_path_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct TraceKernelRuntime {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniforms: TraceUniformsGpu,
    light_bounce_depth: u32,
    surfaces: KernelSurfaces,
}

impl TraceKernelRuntime {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        extent: SurfaceExtent,
        resolution_scale: f32,
        bounce_depth: u32,
        light_bounce_depth: u32,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gpu_runtime.pathtrace.shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("pathtrace.wgsl").into()),
        });

        let bind_group_layout = create_trace_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpu_runtime.pathtrace.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gpu_runtime.pathtrace.pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpu_runtime.pathtrace.uniforms"),
            size: std::mem::size_of::<TraceUniformsGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let surfaces = create_kernel_surfaces(
            &device,
            &bind_group_layout,
            &uniform_buffer,
            extent,
            resolution_scale,
            bounce_depth,
            light_bounce_depth,
        );

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            uniforms: TraceUniformsGpu::zeroed(),
            light_bounce_depth,
            surfaces,
        }
    }

    /// Scaled extent the kernel currently renders at.
    pub fn scaled_extent(&self) -> SurfaceExtent {
        self.surfaces.scaled_extent
    }

    /// Tonemapped output, for presentation.
    pub fn display_view(&self) -> &wgpu::TextureView {
        &self.surfaces.display_view
    }

    pub fn display_format(&self) -> wgpu::TextureFormat {
        self.surfaces.display_target.format()
    }
}

impl TraceKernel for TraceKernelRuntime {
    fn prepare_frame(&mut self, view: &ViewParams, frame: &FrameParams) {
        self.uniforms = TraceUniformsGpu {
            camera_origin: extend(view.origin),
            camera_forward: extend(view.forward),
            camera_right: extend(view.right),
            camera_up: extend(view.up),
            surface_width: self.surfaces.scaled_extent.width,
            surface_height: self.surfaces.scaled_extent.height,
            frame_index: frame.frame_index,
            accumulation_frame: frame.accumulation_frame,
            bounce_depth: frame.bounce_depth,
            tile_block_x: 0,
            tile_block_y: 0,
            field_of_view_degrees: view.field_of_view_degrees,
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
    }

    fn dispatch_tile(&mut self, region: BlockRegion) -> Result<Duration, DispatchError> {
        self.uniforms.tile_block_x = region.block_x;
        self.uniforms.tile_block_y = region.block_y;
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu_runtime.pathtrace.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gpu_runtime.pathtrace.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.surfaces.bind_group, &[]);
            pass.dispatch_workgroups(
                region.blocks_wide * WORKGROUPS_PER_BLOCK_AXIS,
                region.blocks_high * WORKGROUPS_PER_BLOCK_AXIS,
                1,
            );
        }

        let dispatch_started = Instant::now();
        self.queue.submit([encoder.finish()]);
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|error| DispatchError::WaitFailed {
                message: error.to_string(),
            })?;
        Ok(dispatch_started.elapsed())
    }

    fn resize_surfaces(&mut self, extent: SurfaceExtent, resolution_scale: f32, bounce_depth: u32) {
        // Recreated buffers and textures start zeroed, which also clears
        // the accumulated radiance.
        self.surfaces = create_kernel_surfaces(
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            extent,
            resolution_scale,
            bounce_depth,
            self.light_bounce_depth,
        );
    }
}

fn extend(vector: [f32; 3]) -> [f32; 4] {
    [vector[0], vector[1], vector[2], 0.0]
}

fn create_trace_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gpu_runtime.pathtrace.bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn create_kernel_surfaces(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    extent: SurfaceExtent,
    resolution_scale: f32,
    bounce_depth: u32,
    light_bounce_depth: u32,
) -> KernelSurfaces {
    let scaled_extent = extent.scaled(resolution_scale);
    // Degenerate viewports never get dispatched to, but wgpu resources
    // still need non-zero dimensions.
    let width = scaled_extent.width.max(1);
    let height = scaled_extent.height.max(1);
    let texture_size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let pixel_count = u64::from(width) * u64::from(height);
    // Accumulated radiance lives in a read-write storage buffer; rgba32
    // float storage textures cannot be read back from inside the kernel.
    let accumulation_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gpu_runtime.pathtrace.accumulation"),
        size: pixel_count * (std::mem::size_of::<[f32; 4]>() as u64),
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let display_target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("gpu_runtime.pathtrace.display_target"),
        size: texture_size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let path_vertex_stride = std::mem::size_of::<PathVertexGpu>() as u64;
    let camera_path_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gpu_runtime.pathtrace.camera_paths"),
        size: pixel_count * u64::from(bounce_depth + 1) * path_vertex_stride,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let light_path_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gpu_runtime.pathtrace.light_paths"),
        size: pixel_count * u64::from(light_bounce_depth + 2) * path_vertex_stride,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });

    let display_view = display_target.create_view(&wgpu::TextureViewDescriptor::default());

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("gpu_runtime.pathtrace.bind_group"),
        layout: bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: accumulation_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&display_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: camera_path_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: light_path_buffer.as_entire_binding(),
            },
        ],
    });

    KernelSurfaces {
        scaled_extent,
        _accumulation_buffer: accumulation_buffer,
        display_target,
        display_view,
        _camera_path_buffer: camera_path_buffer,
        _light_path_buffer: light_path_buffer,
        bind_group,
    }
}

#[cfg(test)]
mod wgsl_tests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_vertex_record_is_128_bytes() {
        assert_eq!(std::mem::size_of::<PathVertexGpu>(), 128);
    }

    #[test]
    fn trace_uniforms_match_wgsl_layout_size() {
        assert_eq!(std::mem::size_of::<TraceUniformsGpu>(), 96);
    }

    #[test]
    fn workgroups_evenly_divide_a_block() {
        assert_eq!(WORKGROUPS_PER_BLOCK_AXIS * WORKGROUP_SIZE, BLOCK_SIZE);
    }
}
