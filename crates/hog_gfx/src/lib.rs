//! GPU abstraction layer over `wgpu` running the HOG stages as compute passes.

use std::{borrow::Cow, mem::size_of};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use anyhow::{Context, Result};
use bytemuck::{bytes_of, cast_slice};
use hog_core::{
    backend::{DescriptorOutput, GradientOutput, PipelineGeometry, StageNotifier},
    Backend, HarnessError, ImageBuffer, Scalar,
};
use hog_shaders::compute;
use tracing::{debug, info};
use wgpu::{
    Adapter, Backends, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferAsyncError, BufferBindingType, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits, MapMode,
    PipelineLayoutDescriptor, PollType, PowerPreference, Queue, RequestAdapterOptions,
    ShaderStages,
};

/// Headless device handles. No surface: the harness never presents.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

pub struct ShaderModules {
    pub normalize: wgpu::ShaderModule,
    pub gradient: wgpu::ShaderModule,
    pub descriptor: wgpu::ShaderModule,
}

/// Entry point for creating a GPU context and loading shader modules.
pub async fn init() -> Result<(GpuContext, ShaderModules)> {
    let instance_desc = InstanceDescriptor {
        backends: Backends::all(),
        ..Default::default()
    };
    let instance = Instance::new(&instance_desc);

    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .context("no compatible GPU adapter found")?;

    let device_desc = DeviceDescriptor {
        label: Some("HOG Harness Device"),
        required_features: Features::empty(),
        required_limits: Limits::downlevel_defaults(),
        ..Default::default()
    };

    let (device, queue) = adapter
        .request_device(&device_desc)
        .await
        .context("failed to request wgpu device")?;

    let info = adapter.get_info();
    info!(adapter = %info.name, backend = ?info.backend, "gpu device ready");

    let shaders = ShaderModules {
        normalize: create_module(&device, "normalize.wgsl", compute::NORMALIZE),
        gradient: create_module(&device, "gradient.wgsl", compute::GRADIENT),
        descriptor: create_module(&device, "descriptor.wgsl", compute::DESCRIPTOR),
    };

    let context = GpuContext {
        instance,
        adapter,
        device,
        queue,
    };

    Ok((context, shaders))
}

/// Blocking wrapper around [`init`] for callers without an executor.
pub fn init_blocking() -> Result<(GpuContext, ShaderModules)> {
    pollster::block_on(init())
}

fn create_module(device: &Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    })
}

pub fn create_pipeline_layouts(device: &Device) -> PipelineLayouts {
    let buffer_entry = |binding, ty: BufferBindingType| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    let normalize = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("normalize_bind_group_layout"),
        entries: &[
            buffer_entry(0, BufferBindingType::Uniform),
            buffer_entry(1, BufferBindingType::Storage { read_only: false }),
        ],
    });

    let gradient = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("gradient_bind_group_layout"),
        entries: &[
            buffer_entry(0, BufferBindingType::Uniform),
            buffer_entry(1, BufferBindingType::Storage { read_only: true }),
            buffer_entry(2, BufferBindingType::Storage { read_only: false }),
            buffer_entry(3, BufferBindingType::Storage { read_only: false }),
        ],
    });

    let descriptor = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("descriptor_bind_group_layout"),
        entries: &[
            buffer_entry(0, BufferBindingType::Uniform),
            buffer_entry(1, BufferBindingType::Storage { read_only: true }),
            buffer_entry(2, BufferBindingType::Storage { read_only: true }),
            buffer_entry(3, BufferBindingType::Storage { read_only: false }),
        ],
    });

    PipelineLayouts {
        normalize,
        gradient,
        descriptor,
    }
}

#[derive(Debug)]
pub struct PipelineLayouts {
    pub normalize: wgpu::BindGroupLayout,
    pub gradient: wgpu::BindGroupLayout,
    pub descriptor: wgpu::BindGroupLayout,
}

#[derive(Debug)]
pub struct Pipelines {
    pub normalize: ComputePipeline,
    pub gradient: ComputePipeline,
    pub descriptor: ComputePipeline,
}

#[derive(Debug)]
pub struct BindGroups {
    pub normalize: wgpu::BindGroup,
    pub gradient: wgpu::BindGroup,
    pub descriptor: wgpu::BindGroup,
}

/// Device-side copies of every stage buffer plus one shared readback buffer.
#[derive(Debug)]
pub struct Buffers {
    pub params: wgpu::Buffer,
    pub image: wgpu::Buffer,
    pub magnitude: wgpu::Buffer,
    pub phase: wgpu::Buffer,
    pub descriptor: wgpu::Buffer,
    pub staging: wgpu::Buffer,
}

#[derive(Debug, Default)]
struct DispatchCounts {
    pixels_x: u32,
    pixels_y: u32,
    blocks_x: u32,
    blocks_y: u32,
}

/// Owned host buffers and the notifier of an asynchronous call whose readback is pending.
enum Readback {
    Normalize {
        image: ImageBuffer,
        done: StageNotifier<ImageBuffer>,
    },
    Gradient {
        image: ImageBuffer,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        done: StageNotifier<GradientOutput>,
    },
    Descriptor {
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        descriptor: ImageBuffer,
        done: StageNotifier<DescriptorOutput>,
    },
}

impl Readback {
    /// Host slices the staging contents are copied into, in staging order.
    fn targets(&mut self) -> Vec<&mut [Scalar]> {
        match self {
            Readback::Normalize { image, .. } => vec![image.as_mut_slice()],
            Readback::Gradient {
                magnitude, phase, ..
            } => vec![magnitude.as_mut_slice(), phase.as_mut_slice()],
            Readback::Descriptor { descriptor, .. } => vec![descriptor.as_mut_slice()],
        }
    }

    fn complete(self, outcome: hog_core::Result<()>) {
        match self {
            Readback::Normalize { image, done } => done.notify(outcome.map(|()| image)),
            Readback::Gradient {
                image,
                magnitude,
                phase,
                done,
            } => done.notify(outcome.map(|()| GradientOutput {
                image,
                magnitude,
                phase,
            })),
            Readback::Descriptor {
                magnitude,
                phase,
                descriptor,
                done,
            } => done.notify(outcome.map(|()| DescriptorOutput {
                magnitude,
                phase,
                descriptor,
            })),
        }
    }
}

/// What a pending readback turns into after one non-blocking poll.
#[derive(Debug, PartialEq, Eq)]
enum Settle {
    Copy,
    Wait,
    Fail(String),
}

/// A failed poll fails the readback outright: a lost device never fires the map callback.
fn settle(
    polled: std::result::Result<(), String>,
    mapped: std::result::Result<std::result::Result<(), String>, TryRecvError>,
) -> Settle {
    if let Err(err) = polled {
        return Settle::Fail(format!("device poll failed: {err}"));
    }
    match mapped {
        Ok(Ok(())) => Settle::Copy,
        Ok(Err(err)) => Settle::Fail(format!("readback mapping failed: {err}")),
        Err(TryRecvError::Empty) => Settle::Wait,
        Err(TryRecvError::Disconnected) => Settle::Fail("readback callback was dropped".into()),
    }
}

struct PendingReadback {
    readback: Readback,
    bytes: u64,
    mapped: Receiver<Result<(), BufferAsyncError>>,
}

/// WGSL implementation of the three HOG stages for one fixed window geometry.
///
/// Host buffers are the interface: every call uploads its inputs and reads its outputs back,
/// so results can be compared against (and replaced by) another backend's between stages.
pub struct GpuHog {
    name: String,
    geometry: PipelineGeometry,
    device: Device,
    queue: Queue,
    pipelines: Pipelines,
    bind_groups: BindGroups,
    buffers: Buffers,
    dispatch: DispatchCounts,
    pending: Option<PendingReadback>,
}

impl GpuHog {
    pub fn new(context: &GpuContext, shaders: &ShaderModules, geometry: PipelineGeometry) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();
        let layouts = create_pipeline_layouts(&device);
        let pipelines = create_pipelines(&device, &layouts, shaders);

        let image_bytes = byte_len(geometry.image_shape().len());
        let gradient_bytes = byte_len(geometry.gradient_shape().len());
        let descriptor_bytes = byte_len(geometry.descriptor_length());
        let staging_bytes = image_bytes.max(2 * gradient_bytes).max(descriptor_bytes);

        let params = geometry.hog.kernel_params(geometry.window, geometry.format);
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("HogKernelParams Uniform"),
            size: size_of::<hog_core::HogKernelParams>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&params_buffer, 0, bytes_of(&params));

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
        let buffers = Buffers {
            params: params_buffer,
            image: create_buffer(&device, "Window Buffer", image_bytes, storage),
            magnitude: create_buffer(&device, "Magnitude Buffer", gradient_bytes, storage),
            phase: create_buffer(&device, "Phase Buffer", gradient_bytes, storage),
            descriptor: create_buffer(&device, "Descriptor Buffer", descriptor_bytes, storage),
            staging: create_buffer(
                &device,
                "Readback Buffer",
                staging_bytes,
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
        };

        let bind_groups = BindGroups {
            normalize: device.create_bind_group(&BindGroupDescriptor {
                label: Some("Normalize Bind Group"),
                layout: &layouts.normalize,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: buffers.params.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: buffers.image.as_entire_binding(),
                    },
                ],
            }),
            gradient: device.create_bind_group(&BindGroupDescriptor {
                label: Some("Gradient Bind Group"),
                layout: &layouts.gradient,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: buffers.params.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: buffers.image.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: buffers.magnitude.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 3,
                        resource: buffers.phase.as_entire_binding(),
                    },
                ],
            }),
            descriptor: device.create_bind_group(&BindGroupDescriptor {
                label: Some("Descriptor Bind Group"),
                layout: &layouts.descriptor,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: buffers.params.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: buffers.magnitude.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: buffers.phase.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 3,
                        resource: buffers.descriptor.as_entire_binding(),
                    },
                ],
            }),
        };

        let blocks = geometry.hog.blocks(geometry.window);
        let dispatch = DispatchCounts {
            pixels_x: div_ceil(geometry.window.x, compute::PIXEL_WORKGROUP),
            pixels_y: div_ceil(geometry.window.y, compute::PIXEL_WORKGROUP),
            blocks_x: div_ceil(blocks.x, compute::BLOCK_WORKGROUP),
            blocks_y: div_ceil(blocks.y, compute::BLOCK_WORKGROUP),
        };
        debug!(?dispatch, staging_bytes, "gpu hog buffers allocated");

        Self {
            name: "gpu".to_string(),
            geometry,
            device,
            queue,
            pipelines,
            bind_groups,
            buffers,
            dispatch,
            pending: None,
        }
    }

    /// Initializes a device and builds a backend for `geometry` in one call.
    pub fn create(geometry: PipelineGeometry) -> Result<Self> {
        let (context, shaders) = init_blocking()?;
        Ok(Self::new(&context, &shaders, geometry))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn fail(&self, message: impl Into<String>) -> HarnessError {
        HarnessError::backend(self.name.clone(), message)
    }

    fn upload(&self, target: &wgpu::Buffer, data: &ImageBuffer) {
        self.queue.write_buffer(target, 0, cast_slice(data.as_slice()));
    }

    fn submit_normalize(&self, image: &ImageBuffer) -> u64 {
        self.upload(&self.buffers.image, image);
        let bytes = byte_len(image.as_slice().len());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Normalize Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("Normalize Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.normalize);
            pass.set_bind_group(0, &self.bind_groups.normalize, &[]);
            pass.dispatch_workgroups(self.dispatch.pixels_x, self.dispatch.pixels_y, 1);
        }
        encoder.copy_buffer_to_buffer(&self.buffers.image, 0, &self.buffers.staging, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));
        bytes
    }

    fn submit_gradient(&self, image: &ImageBuffer) -> u64 {
        self.upload(&self.buffers.image, image);
        let plane = byte_len(self.geometry.gradient_shape().len());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Gradient Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("Gradient Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.gradient);
            pass.set_bind_group(0, &self.bind_groups.gradient, &[]);
            pass.dispatch_workgroups(self.dispatch.pixels_x, self.dispatch.pixels_y, 1);
        }
        encoder.copy_buffer_to_buffer(&self.buffers.magnitude, 0, &self.buffers.staging, 0, plane);
        encoder.copy_buffer_to_buffer(&self.buffers.phase, 0, &self.buffers.staging, plane, plane);
        self.queue.submit(std::iter::once(encoder.finish()));
        2 * plane
    }

    fn submit_descriptor(&self, magnitude: &ImageBuffer, phase: &ImageBuffer) -> u64 {
        self.upload(&self.buffers.magnitude, magnitude);
        self.upload(&self.buffers.phase, phase);
        let bytes = byte_len(self.geometry.descriptor_length());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Descriptor Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("Descriptor Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.descriptor);
            pass.set_bind_group(0, &self.bind_groups.descriptor, &[]);
            pass.dispatch_workgroups(self.dispatch.blocks_x, self.dispatch.blocks_y, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.buffers.descriptor,
            0,
            &self.buffers.staging,
            0,
            bytes,
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        bytes
    }

    fn request_map(&self, bytes: u64) -> Receiver<Result<(), BufferAsyncError>> {
        let (sender, receiver) = mpsc::channel();
        self.buffers
            .staging
            .slice(..bytes)
            .map_async(MapMode::Read, move |res| {
                let _ = sender.send(res);
            });
        receiver
    }

    /// Copies the mapped staging prefix into `targets` back to back, then unmaps.
    fn copy_out(&self, bytes: u64, targets: &mut [&mut [Scalar]]) {
        {
            let data = self.buffers.staging.slice(..bytes).get_mapped_range();
            let values: &[Scalar] = cast_slice(&data);
            let mut offset = 0;
            for target in targets.iter_mut() {
                let len = target.len();
                target.copy_from_slice(&values[offset..offset + len]);
                offset += len;
            }
        }
        self.buffers.staging.unmap();
    }

    fn read_back(&self, bytes: u64, targets: &mut [&mut [Scalar]]) -> hog_core::Result<()> {
        let mapped = self.request_map(bytes);
        self.device
            .poll(PollType::Wait)
            .map_err(|err| self.fail(format!("device poll failed: {err}")))?;
        match mapped.recv() {
            Ok(Ok(())) => {
                self.copy_out(bytes, targets);
                Ok(())
            }
            Ok(Err(err)) => Err(self.fail(format!("readback mapping failed: {err}"))),
            Err(_) => Err(self.fail("readback callback was dropped")),
        }
    }

    /// Parks `readback` until its staging copy is mapped. `bytes` is `None` when nothing was
    /// submitted because another call is still pending.
    fn begin_submitted(&mut self, readback: Readback, bytes: Option<u64>) {
        let Some(bytes) = bytes else {
            let err = self.fail("an asynchronous call is already in flight");
            readback.complete(Err(err));
            return;
        };
        let mapped = self.request_map(bytes);
        self.pending = Some(PendingReadback {
            readback,
            bytes,
            mapped,
        });
    }

    fn ensure_idle(&self) -> hog_core::Result<()> {
        if self.pending.is_some() {
            return Err(self.fail("synchronous call issued while an asynchronous one is pending"));
        }
        Ok(())
    }
}

impl Backend for GpuHog {
    fn name(&self) -> &str {
        &self.name
    }

    fn geometry(&self) -> &PipelineGeometry {
        &self.geometry
    }

    fn normalize(&mut self, image: &mut ImageBuffer) -> hog_core::Result<()> {
        self.geometry.check_normalize(image)?;
        self.ensure_idle()?;
        let bytes = self.submit_normalize(image);
        self.read_back(bytes, &mut [image.as_mut_slice()])
    }

    fn compute_gradient(
        &mut self,
        image: &ImageBuffer,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
    ) -> hog_core::Result<()> {
        self.geometry.check_gradient(image, magnitude, phase)?;
        self.ensure_idle()?;
        let bytes = self.submit_gradient(image);
        self.read_back(bytes, &mut [magnitude.as_mut_slice(), phase.as_mut_slice()])
    }

    fn compute_descriptor(
        &mut self,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
        descriptor: &mut ImageBuffer,
    ) -> hog_core::Result<()> {
        self.geometry.check_descriptor(magnitude, phase, descriptor)?;
        self.ensure_idle()?;
        let bytes = self.submit_descriptor(magnitude, phase);
        self.read_back(bytes, &mut [descriptor.as_mut_slice()])
    }

    fn make_progress(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let polled = self
            .device
            .poll(PollType::Poll)
            .map(|_| ())
            .map_err(|err| err.to_string());
        let mapped = pending
            .mapped
            .try_recv()
            .map(|res| res.map_err(|err| err.to_string()));
        match settle(polled, mapped) {
            Settle::Copy => {
                let mut readback = pending.readback;
                self.copy_out(pending.bytes, &mut readback.targets());
                readback.complete(Ok(()));
            }
            Settle::Wait => self.pending = Some(pending),
            Settle::Fail(message) => {
                // aborts a map request that may still be outstanding
                self.buffers.staging.unmap();
                pending.readback.complete(Err(self.fail(message)));
            }
        }
    }

    fn normalize_async(&mut self, image: ImageBuffer, done: StageNotifier<ImageBuffer>) {
        if let Err(err) = self.geometry.check_normalize(&image) {
            done.notify(Err(err));
            return;
        }
        let bytes = if self.pending.is_none() {
            Some(self.submit_normalize(&image))
        } else {
            None
        };
        self.begin_submitted(Readback::Normalize { image, done }, bytes);
    }

    fn compute_gradient_async(
        &mut self,
        image: ImageBuffer,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        done: StageNotifier<GradientOutput>,
    ) {
        if let Err(err) = self.geometry.check_gradient(&image, &magnitude, &phase) {
            done.notify(Err(err));
            return;
        }
        // `write_buffer` copies the host data, so the buffers can move into the readback
        let bytes = if self.pending.is_none() {
            Some(self.submit_gradient(&image))
        } else {
            None
        };
        let readback = Readback::Gradient {
            image,
            magnitude,
            phase,
            done,
        };
        self.begin_submitted(readback, bytes);
    }

    fn compute_descriptor_async(
        &mut self,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        descriptor: ImageBuffer,
        done: StageNotifier<DescriptorOutput>,
    ) {
        if let Err(err) = self
            .geometry
            .check_descriptor(&magnitude, &phase, &descriptor)
        {
            done.notify(Err(err));
            return;
        }
        let bytes = if self.pending.is_none() {
            Some(self.submit_descriptor(&magnitude, &phase))
        } else {
            None
        };
        let readback = Readback::Descriptor {
            magnitude,
            phase,
            descriptor,
            done,
        };
        self.begin_submitted(readback, bytes);
    }
}

fn create_pipelines(
    device: &Device,
    layouts: &PipelineLayouts,
    shaders: &ShaderModules,
) -> Pipelines {
    let normalize_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("Normalize Pipeline Layout"),
        bind_group_layouts: &[&layouts.normalize],
        push_constant_ranges: &[],
    });
    let gradient_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("Gradient Pipeline Layout"),
        bind_group_layouts: &[&layouts.gradient],
        push_constant_ranges: &[],
    });
    let descriptor_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("Descriptor Pipeline Layout"),
        bind_group_layouts: &[&layouts.descriptor],
        push_constant_ranges: &[],
    });

    let normalize = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some("Normalize Pipeline"),
        layout: Some(&normalize_pipeline_layout),
        module: &shaders.normalize,
        entry_point: Some(compute::NORMALIZE_ENTRY),
        compilation_options: Default::default(),
        cache: None,
    });

    let gradient = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some("Gradient Pipeline"),
        layout: Some(&gradient_pipeline_layout),
        module: &shaders.gradient,
        entry_point: Some(compute::GRADIENT_ENTRY),
        compilation_options: Default::default(),
        cache: None,
    });

    let descriptor = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some("Descriptor Pipeline"),
        layout: Some(&descriptor_pipeline_layout),
        module: &shaders.descriptor,
        entry_point: Some(compute::DESCRIPTOR_ENTRY),
        compilation_options: Default::default(),
        cache: None,
    });

    Pipelines {
        normalize,
        gradient,
        descriptor,
    }
}

fn create_buffer(device: &Device, label: &str, size: u64, usage: BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(4),
        usage,
        mapped_at_creation: false,
    })
}

fn byte_len(elements: usize) -> u64 {
    (elements * size_of::<Scalar>()) as u64
}

const fn div_ceil(value: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        0
    } else if value == 0 {
        0
    } else {
        ((value - 1) / divisor) + 1
    }
}
