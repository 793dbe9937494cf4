use std::borrow::Cow;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use cgmath::Matrix4;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
  ArrayId, BufferId, BufferTarget, BufferUsage, ComponentType, DepthCompare, DrawCall, DrawUniforms,
  GpuError, GraphicsBackend, RasterState, ShaderProgram, TextureId, TextureImage, VertexAttribute,
};
use crate::camera::OPENGL_TO_WGPU_MATRIX;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const UNIFORM_SIZE: u64 = mem::size_of::<DrawUniforms>() as u64;
const INITIAL_UNIFORM_SLOTS: u64 = 64;

struct GpuBuffer {
  buffer: wgpu::Buffer,
  target: BufferTarget,
}

struct VertexArray {
  vertex_buffer: Option<BufferId>,
  index_buffer: Option<BufferId>,
  layout: Vec<VertexAttribute>,
}

struct GpuTexture {
  _texture: wgpu::Texture,
  bind_group: wgpu::BindGroup,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
  program: ShaderProgram,
  state: RasterState,
  layout: Vec<VertexAttribute>,
}

struct UniformRing {
  buffer: wgpu::Buffer,
  bind_group: wgpu::BindGroup,
  slots: u64,
}

/// The windowed backend. Draw calls are collected during the frame and
/// encoded into one render pass by `end_frame`.
pub struct WgpuBackend {
  surface: wgpu::Surface<'static>,
  device: wgpu::Device,
  queue: wgpu::Queue,
  config: wgpu::SurfaceConfiguration,
  depth_view: wgpu::TextureView,
  shaders: HashMap<ShaderProgram, wgpu::ShaderModule>,
  uniform_layout: wgpu::BindGroupLayout,
  texture_layout: wgpu::BindGroupLayout,
  cubemap_layout: wgpu::BindGroupLayout,
  sampler: wgpu::Sampler,
  uniforms: UniformRing,
  uniform_stride: u64,
  pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
  next_id: u32,
  buffers: HashMap<BufferId, GpuBuffer>,
  arrays: HashMap<ArrayId, VertexArray>,
  textures: HashMap<TextureId, GpuTexture>,
  state: RasterState,
  frame: Vec<(DrawCall, RasterState)>,
}

impl WgpuBackend {
  pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
    let size = window.inner_size();
    let width = size.width.max(1);
    let height = size.height.max(1);

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
      #[cfg(not(target_arch = "wasm32"))]
      backends: wgpu::Backends::PRIMARY,
      ..Default::default()
    });
    let surface = instance.create_surface(window)?;

    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
      })
      .await
      .ok_or(GpuError::NoAdapter)?;
    info!("Using adapter {:?}", adapter.get_info().name);

    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          label: None,
          required_features: wgpu::Features::empty(),
          required_limits: wgpu::Limits::default(),
          memory_hints: Default::default(),
        },
        None,
      )
      .await?;

    let mut config = surface
      .get_default_config(&adapter, width, height)
      .ok_or(GpuError::UnsupportedSurface)?;
    config.present_mode = wgpu::PresentMode::AutoVsync;
    surface.configure(&device, &config);

    let depth_view = create_depth_view(&device, &config);
    let shaders = [
      (ShaderProgram::Body, "body", include_str!("../shaders/body.wgsl")),
      (ShaderProgram::Ring, "ring", include_str!("../shaders/ring.wgsl")),
      (ShaderProgram::Skybox, "skybox", include_str!("../shaders/skybox.wgsl")),
    ]
    .into_iter()
    .map(|(program, label, source)| {
      let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
      });
      (program, module)
    })
    .collect();

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      label: Some("uniform_bind_group_layout"),
      entries: &[wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
          ty: wgpu::BufferBindingType::Uniform,
          has_dynamic_offset: true,
          min_binding_size: wgpu::BufferSize::new(UNIFORM_SIZE),
        },
        count: None,
      }],
    });
    let texture_layout = texture_bind_group_layout(&device, wgpu::TextureViewDimension::D2);
    let cubemap_layout = texture_bind_group_layout(&device, wgpu::TextureViewDimension::Cube);
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      label: Some("texture sampler"),
      address_mode_u: wgpu::AddressMode::Repeat,
      address_mode_v: wgpu::AddressMode::ClampToEdge,
      address_mode_w: wgpu::AddressMode::ClampToEdge,
      mag_filter: wgpu::FilterMode::Linear,
      min_filter: wgpu::FilterMode::Linear,
      mipmap_filter: wgpu::FilterMode::Nearest,
      ..Default::default()
    });

    let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
    let uniform_stride = UNIFORM_SIZE.div_ceil(alignment) * alignment;
    let uniforms = create_uniform_ring(&device, &uniform_layout, uniform_stride, INITIAL_UNIFORM_SLOTS);

    Ok(Self {
      surface,
      device,
      queue,
      config,
      depth_view,
      shaders,
      uniform_layout,
      texture_layout,
      cubemap_layout,
      sampler,
      uniforms,
      uniform_stride,
      pipelines: HashMap::new(),
      next_id: 0,
      buffers: HashMap::new(),
      arrays: HashMap::new(),
      textures: HashMap::new(),
      state: RasterState::default(),
      frame: Vec::new(),
    })
  }

  pub fn size(&self) -> (u32, u32) {
    (self.config.width, self.config.height)
  }

  pub fn resize(&mut self, width: u32, height: u32) {
    if width == 0 || height == 0 {
      return;
    }
    self.config.width = width;
    self.config.height = height;
    self.surface.configure(&self.device, &self.config);
    self.depth_view = create_depth_view(&self.device, &self.config);
    debug!("Surface resized to {width}x{height}");
  }

  fn next_id(&mut self) -> u32 {
    self.next_id += 1;
    self.next_id
  }

  fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, GpuError> {
    match self.surface.get_current_texture() {
      Ok(frame) => Ok(frame),
      Err(wgpu::SurfaceError::Timeout) => Ok(self.surface.get_current_texture()?),
      Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
        self.surface.configure(&self.device, &self.config);
        Ok(self.surface.get_current_texture()?)
      }
      Err(error) => Err(error.into()),
    }
  }

  fn upload_texture(
    &mut self,
    label: &str,
    images: &[TextureImage],
    dimension: wgpu::TextureViewDimension,
  ) -> Result<TextureId, GpuError> {
    let Some(first) = images.first() else {
      return Err(GpuError::Allocation {
        what: "texture",
        label: label.to_owned(),
      });
    };
    let size = wgpu::Extent3d {
      width: first.width,
      height: first.height,
      depth_or_array_layers: images.len() as u32,
    };
    let texture = self.device.create_texture(&wgpu::TextureDescriptor {
      label: Some(label),
      size,
      mip_level_count: 1,
      sample_count: 1,
      dimension: wgpu::TextureDimension::D2,
      format: wgpu::TextureFormat::Rgba8UnormSrgb,
      usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
      view_formats: &[],
    });

    for (layer, image) in images.iter().enumerate() {
      self.queue.write_texture(
        wgpu::ImageCopyTexture {
          texture: &texture,
          mip_level: 0,
          origin: wgpu::Origin3d {
            x: 0,
            y: 0,
            z: layer as u32,
          },
          aspect: wgpu::TextureAspect::All,
        },
        &image.pixels,
        wgpu::ImageDataLayout {
          offset: 0,
          bytes_per_row: Some(4 * image.width),
          rows_per_image: Some(image.height),
        },
        wgpu::Extent3d {
          width: image.width,
          height: image.height,
          depth_or_array_layers: 1,
        },
      );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
      dimension: Some(dimension),
      ..Default::default()
    });
    let layout = match dimension {
      wgpu::TextureViewDimension::Cube => &self.cubemap_layout,
      _ => &self.texture_layout,
    };
    let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
      label: Some(label),
      layout,
      entries: &[
        wgpu::BindGroupEntry {
          binding: 0,
          resource: wgpu::BindingResource::TextureView(&view),
        },
        wgpu::BindGroupEntry {
          binding: 1,
          resource: wgpu::BindingResource::Sampler(&self.sampler),
        },
      ],
    });

    let id = TextureId(self.next_id());
    self.textures.insert(
      id,
      GpuTexture {
        _texture: texture,
        bind_group,
      },
    );
    Ok(id)
  }

  fn ensure_pipeline(&mut self, key: &PipelineKey) {
    if self.pipelines.contains_key(key) {
      return;
    }
    let pipeline = self.create_pipeline(key);
    self.pipelines.insert(key.clone(), pipeline);
  }

  fn create_pipeline(&self, key: &PipelineKey) -> wgpu::RenderPipeline {
    debug!("Creating pipeline for {:?} with {:?}", key.program, key.state);
    let texture_layout = match key.program {
      ShaderProgram::Skybox => &self.cubemap_layout,
      ShaderProgram::Body | ShaderProgram::Ring => &self.texture_layout,
    };
    let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("render"),
      bind_group_layouts: &[&self.uniform_layout, texture_layout],
      push_constant_ranges: &[],
    });
    let module = &self.shaders[&key.program];

    let attributes: Vec<wgpu::VertexAttribute> = key
      .layout
      .iter()
      .map(|attribute| wgpu::VertexAttribute {
        format: vertex_format(attribute),
        offset: attribute.offset,
        shader_location: attribute.slot,
      })
      .collect();
    let vertex_buffer = wgpu::VertexBufferLayout {
      array_stride: key.layout.first().map_or(0, |a| u64::from(a.stride)),
      step_mode: wgpu::VertexStepMode::Vertex,
      attributes: &attributes,
    };

    let blend = if key.state.blend {
      wgpu::BlendState::ALPHA_BLENDING
    } else {
      wgpu::BlendState::REPLACE
    };

    self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
      label: Some("Render Pipeline"),
      layout: Some(&layout),
      vertex: wgpu::VertexState {
        module,
        entry_point: "vs_main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        buffers: &[vertex_buffer],
      },
      fragment: Some(wgpu::FragmentState {
        module,
        entry_point: "fs_main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        targets: &[Some(wgpu::ColorTargetState {
          format: self.config.format,
          blend: Some(blend),
          write_mask: wgpu::ColorWrites::ALL,
        })],
      }),
      primitive: wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: key.state.cull_back_faces.then_some(wgpu::Face::Back),
        ..Default::default()
      },
      depth_stencil: Some(wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: key.state.depth_write,
        depth_compare: match key.state.depth_compare {
          DepthCompare::Less => wgpu::CompareFunction::Less,
          DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
      }),
      multisample: wgpu::MultisampleState::default(),
      multiview: None,
      cache: None,
    })
  }

  /// Grows the uniform buffer to hold `count` draws and uploads them.
  fn write_uniforms(&mut self, draws: &[(DrawCall, RasterState)]) {
    let count = draws.len() as u64;
    if count > self.uniforms.slots {
      let slots = count.next_power_of_two();
      debug!("Growing uniform buffer to {slots} slots");
      self.uniforms = create_uniform_ring(&self.device, &self.uniform_layout, self.uniform_stride, slots);
    }

    let mut staging = vec![0u8; (count * self.uniform_stride) as usize];
    for (index, (call, _)) in draws.iter().enumerate() {
      let mut uniforms = call.uniforms;
      uniforms.projection = (OPENGL_TO_WGPU_MATRIX * Matrix4::from(uniforms.projection)).into();
      let start = index * self.uniform_stride as usize;
      staging[start..start + UNIFORM_SIZE as usize].copy_from_slice(bytemuck::bytes_of(&uniforms));
    }
    if !staging.is_empty() {
      self.queue.write_buffer(&self.uniforms.buffer, 0, &staging);
    }
  }
}

impl GraphicsBackend for WgpuBackend {
  fn create_vertex_array(&mut self, label: &str) -> Result<ArrayId, GpuError> {
    let array = ArrayId(self.next_id());
    debug!("vertex array {array:?} for `{label}`");
    self.arrays.insert(
      array,
      VertexArray {
        vertex_buffer: None,
        index_buffer: None,
        layout: Vec::new(),
      },
    );
    Ok(array)
  }

  fn create_buffer(
    &mut self,
    label: &str,
    target: BufferTarget,
    contents: &[u8],
    usage: BufferUsage,
  ) -> Result<BufferId, GpuError> {
    let limit = self.device.limits().max_buffer_size;
    if contents.len() as u64 > limit {
      return Err(GpuError::BufferTooLarge {
        label: label.to_owned(),
        size: contents.len() as u64,
        limit,
      });
    }

    let mut usages = match target {
      BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
      BufferTarget::Index => wgpu::BufferUsages::INDEX,
    };
    if usage != BufferUsage::Static {
      usages |= wgpu::BufferUsages::COPY_DST;
    }
    let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some(label),
      contents,
      usage: usages,
    });

    let id = BufferId(self.next_id());
    self.buffers.insert(id, GpuBuffer { buffer, target });
    Ok(id)
  }

  fn bind_vertex_layout(
    &mut self,
    array: ArrayId,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    attributes: &[VertexAttribute],
  ) -> Result<(), GpuError> {
    for buffer in std::iter::once(vertex_buffer).chain(index_buffer) {
      if !self.buffers.contains_key(&buffer) {
        return Err(GpuError::UnknownBuffer(buffer));
      }
    }
    let entry = self.arrays.get_mut(&array).ok_or(GpuError::UnknownArray(array))?;
    entry.vertex_buffer = Some(vertex_buffer);
    entry.index_buffer = index_buffer;
    entry.layout = attributes.to_vec();
    Ok(())
  }

  fn delete_vertex_array(&mut self, array: ArrayId) {
    if self.arrays.remove(&array).is_none() {
      warn!("vertex array {array:?} freed twice");
    }
  }

  fn delete_buffer(&mut self, buffer: BufferId) {
    match self.buffers.remove(&buffer) {
      Some(entry) => {
        debug!("destroying {:?} buffer {buffer:?}", entry.target);
        entry.buffer.destroy();
      }
      None => warn!("buffer {buffer:?} freed twice"),
    }
  }

  fn create_texture(&mut self, label: &str, image: &TextureImage) -> Result<TextureId, GpuError> {
    self.upload_texture(label, std::slice::from_ref(image), wgpu::TextureViewDimension::D2)
  }

  fn create_cubemap(&mut self, label: &str, faces: &[TextureImage]) -> Result<TextureId, GpuError> {
    let same_size = faces
      .iter()
      .all(|face| face.width == faces[0].width && face.height == faces[0].height);
    if faces.len() != 6 || !same_size {
      return Err(GpuError::CubemapFaces(faces.len()));
    }
    self.upload_texture(label, faces, wgpu::TextureViewDimension::Cube)
  }

  fn raster_state(&self) -> RasterState {
    self.state
  }

  fn set_raster_state(&mut self, state: RasterState) {
    self.state = state;
  }

  fn begin_frame(&mut self) {
    self.frame.clear();
  }

  fn draw(&mut self, call: DrawCall) {
    self.frame.push((call, self.state));
  }

  fn end_frame(&mut self) -> Result<(), GpuError> {
    let draws = mem::take(&mut self.frame);

    let mut keys = Vec::with_capacity(draws.len());
    for (call, state) in &draws {
      let key = self.arrays.get(&call.array).map(|array| PipelineKey {
        program: call.program,
        state: *state,
        layout: array.layout.clone(),
      });
      if let Some(key) = &key {
        self.ensure_pipeline(key);
      }
      keys.push(key);
    }
    self.write_uniforms(&draws);

    let frame = self.acquire()?;
    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = self
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
      let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: None,
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
          view: &view,
          resolve_target: None,
          ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
          },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
          view: &self.depth_view,
          depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
          }),
          stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
      });

      for (index, ((call, _), key)) in draws.iter().zip(&keys).enumerate() {
        let (Some(key), Some(array)) = (key, self.arrays.get(&call.array)) else {
          warn!("Skipping draw of unknown vertex array {:?}", call.array);
          continue;
        };
        let Some(vertex_buffer) = array.vertex_buffer.and_then(|id| self.buffers.get(&id)) else {
          continue;
        };
        let Some(texture) = call.texture.and_then(|id| self.textures.get(&id)) else {
          debug!("Skipping draw without a texture");
          continue;
        };

        let offset = (index as u64 * self.uniform_stride) as u32;
        rpass.set_pipeline(&self.pipelines[key]);
        rpass.set_bind_group(0, &self.uniforms.bind_group, &[offset]);
        rpass.set_bind_group(1, &texture.bind_group, &[]);
        rpass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));

        let index_buffer = array.index_buffer.and_then(|id| self.buffers.get(&id));
        match (call.indexed, index_buffer) {
          (true, Some(index_buffer)) => {
            rpass.set_index_buffer(index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..call.count, 0, 0..1);
          }
          (true, None) => warn!("Indexed draw of {:?} without an index buffer", call.array),
          (false, _) => rpass.draw(0..call.count, 0..1),
        }
      }
    }
    self.queue.submit(Some(encoder.finish()));
    frame.present();
    Ok(())
  }
}

fn vertex_format(attribute: &VertexAttribute) -> wgpu::VertexFormat {
  match (attribute.component_type, attribute.components) {
    (ComponentType::Float32, 1) => wgpu::VertexFormat::Float32,
    (ComponentType::Float32, 2) => wgpu::VertexFormat::Float32x2,
    (ComponentType::Float32, 3) => wgpu::VertexFormat::Float32x3,
    (ComponentType::Float32, _) => wgpu::VertexFormat::Float32x4,
    (ComponentType::Uint32, 1) => wgpu::VertexFormat::Uint32,
    (ComponentType::Uint32, 2) => wgpu::VertexFormat::Uint32x2,
    (ComponentType::Uint32, 3) => wgpu::VertexFormat::Uint32x3,
    (ComponentType::Uint32, _) => wgpu::VertexFormat::Uint32x4,
  }
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
  let texture = device.create_texture(&wgpu::TextureDescriptor {
    label: Some("depth"),
    size: wgpu::Extent3d {
      width: config.width,
      height: config.height,
      depth_or_array_layers: 1,
    },
    mip_level_count: 1,
    sample_count: 1,
    dimension: wgpu::TextureDimension::D2,
    format: DEPTH_FORMAT,
    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
    view_formats: &[],
  });
  texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn texture_bind_group_layout(
  device: &wgpu::Device,
  view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
  device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
    label: Some("texture_bind_group_layout"),
    entries: &[
      wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
          sample_type: wgpu::TextureSampleType::Float { filterable: true },
          view_dimension,
          multisampled: false,
        },
        count: None,
      },
      wgpu::BindGroupLayoutEntry {
        binding: 1,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
      },
    ],
  })
}

fn create_uniform_ring(
  device: &wgpu::Device,
  layout: &wgpu::BindGroupLayout,
  stride: u64,
  slots: u64,
) -> UniformRing {
  let buffer = device.create_buffer(&wgpu::BufferDescriptor {
    label: Some("Draw Uniform Buffer"),
    size: stride * slots,
    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    mapped_at_creation: false,
  });
  let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
    label: Some("uniform_bind_group"),
    layout,
    entries: &[wgpu::BindGroupEntry {
      binding: 0,
      resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer: &buffer,
        offset: 0,
        size: wgpu::BufferSize::new(UNIFORM_SIZE),
      }),
    }],
  });
  UniformRing {
    buffer,
    bind_group,
    slots,
  }
}
