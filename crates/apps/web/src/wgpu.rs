/// The globe draws through a single WebGL context; pipelines and blending
/// assume GL semantics.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
const INSTANCE_BACKENDS: ::wgpu::Backends = ::wgpu::Backends::GL;

#[cfg(target_arch = "wasm32")]
mod imp {
    use ::wgpu::util::DeviceExt;
    use std::borrow::Cow;
    use std::collections::BTreeMap;
    use wasm_bindgen::prelude::*;

    use gpu::{
        BackendKind, FramePlan, RenderBackend, RenderCommand, RenderError, ResourceId,
        ResourceKind, ResourceRegistry,
    };
    use layers::TextureImage;
    use scene::{AnimationId, ArcGeometry, Retired, SphereMesh};

    const DEPTH_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Depth24Plus;

    const GLOBALS_WGSL: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
    viewport: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

fn quad_corner(vid: u32) -> vec2<f32> {
    let x = f32(vid & 1u) * 2.0 - 1.0;
    let y = f32((vid >> 1u) & 1u) * 2.0 - 1.0;
    return vec2<f32>(x, y);
}
"#;

    const EARTH_SHADER: &str = r#"
@group(1) @binding(0)
var surface_tex: texture_2d<f32>;
@group(1) @binding(1)
var surface_sampler: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = globals.view_proj * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let c = textureSample(surface_tex, surface_sampler, in.uv);
    return vec4<f32>(c.rgb, 1.0);
}
"#;

    const ARC_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) alpha: f32,
    @location(1) progress: f32,
    @location(2) color: vec3<f32>,
    @location(3) fade: f32,
};

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) alpha: f32,
    @location(2) progress: f32,
    @location(3) color: vec3<f32>,
    @location(4) fade: f32,
) -> VsOut {
    var out: VsOut;
    out.pos = globals.view_proj * vec4<f32>(position, 1.0);
    out.alpha = alpha;
    out.progress = progress;
    out.color = color;
    out.fade = fade;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    // Eight dashes along the arc, 80% lit.
    if (fract(in.progress * 8.0) > 0.8) {
        discard;
    }
    let a = min(in.alpha * in.fade * 2.5, 1.0);
    return vec4<f32>(in.color * a, a);
}
"#;

    const RIPPLE_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) world: vec3<f32>,
    @location(2) color: vec3<f32>,
    @location(3) alpha: f32,
    @location(4) ring_width: f32,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vid: u32,
    @location(0) center: vec3<f32>,
    @location(1) size_px: f32,
    @location(2) color: vec3<f32>,
    @location(3) alpha: f32,
    @location(4) ring_width: f32,
) -> VsOut {
    let corner = quad_corner(vid);
    let clip = globals.view_proj * vec4<f32>(center, 1.0);
    let offset = corner * (size_px / globals.viewport.xy) * clip.w;
    var out: VsOut;
    out.pos = vec4<f32>(clip.xy + offset, clip.zw);
    out.local = corner * 0.5;
    out.world = center;
    out.color = color;
    out.alpha = alpha;
    out.ring_width = ring_width;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let to_eye = normalize(globals.eye.xyz - in.world);
    if (dot(to_eye, normalize(in.world)) < 0.0) {
        discard;
    }
    let dist = length(in.local);
    if (dist > 0.5) {
        discard;
    }
    let inner = 0.5 - in.ring_width;
    let ring = smoothstep(inner - 0.05, inner, dist) * (1.0 - smoothstep(0.45, 0.5, dist));
    let a = ring * in.alpha;
    if (a < 0.01) {
        discard;
    }
    return vec4<f32>(in.color * a, a);
}
"#;

    const POINTS_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) offset: vec2<f32>,
    @location(1) radius: f32,
    @location(2) color: vec3<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vid: u32,
    @location(0) center: vec2<f32>,
    @location(1) radius: f32,
    @location(2) color: vec3<f32>,
) -> VsOut {
    let offset = quad_corner(vid) * radius * 2.0;
    let px = center + offset;
    var out: VsOut;
    out.pos = vec4<f32>(
        px.x / globals.viewport.x * 2.0 - 1.0,
        1.0 - px.y / globals.viewport.y * 2.0,
        0.0,
        1.0,
    );
    out.offset = offset;
    out.radius = radius;
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let d = length(in.offset);
    let outer = in.radius * 2.0;
    if (d > outer) {
        discard;
    }
    // Halo: opaque at the center, half at r, clear at 2r; solid core to 0.6r.
    let t = d / outer;
    var a = select(mix(0.5, 0.0, (t - 0.5) * 2.0), mix(1.0, 0.5, t * 2.0), t < 0.5);
    if (d <= in.radius * 0.6) {
        a = 1.0;
    }
    return vec4<f32>(in.color * a, a);
}
"#;

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Globals {
        view_proj: [[f32; 4]; 4],
        eye: [f32; 4],
        viewport: [f32; 4],
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct SphereVertex {
        position: [f32; 3],
        uv: [f32; 2],
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct ArcVertex {
        position: [f32; 3],
        alpha: f32,
        progress: f32,
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct ArcInstance {
        color: [f32; 3],
        fade: f32,
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct RippleInstance {
        center: [f32; 3],
        size_px: f32,
        color: [f32; 3],
        alpha: f32,
        ring_width: f32,
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct PointInstance {
        center: [f32; 2],
        radius: f32,
        color: [f32; 3],
    }

    #[derive(Debug)]
    enum GpuResource {
        Buffer(::wgpu::Buffer),
        Texture(::wgpu::Texture),
        Program(::wgpu::RenderPipeline),
    }

    impl GpuResource {
        fn free(self) {
            match self {
                GpuResource::Buffer(b) => b.destroy(),
                GpuResource::Texture(t) => t.destroy(),
                GpuResource::Program(_) => {}
            }
        }
    }

    /// Per-frame instance data, grown by doubling.
    #[derive(Debug, Default)]
    struct InstanceBuffer {
        id: Option<ResourceId>,
        capacity: u64,
    }

    #[derive(Debug, Clone, Copy)]
    enum InstanceSlot {
        Arc,
        Ripple,
        Point,
    }

    #[derive(Debug, Clone, Copy)]
    struct Programs {
        earth: ResourceId,
        arc: ResourceId,
        ripple: ResourceId,
        points: ResourceId,
    }

    #[derive(Debug)]
    pub struct WgpuBackend {
        _instance: &'static ::wgpu::Instance,
        surface: ::wgpu::Surface<'static>,
        device: ::wgpu::Device,
        queue: ::wgpu::Queue,
        config: ::wgpu::SurfaceConfiguration,
        _canvas: web_sys::HtmlCanvasElement,
        depth_view: ::wgpu::TextureView,
        globals: ResourceId,
        globals_bind_group: ::wgpu::BindGroup,
        texture_layout: ::wgpu::BindGroupLayout,
        sampler: ::wgpu::Sampler,
        texture: ResourceId,
        texture_bind_group: ::wgpu::BindGroup,
        programs: Programs,
        sphere_vertices: ResourceId,
        sphere_indices: ResourceId,
        sphere_index_count: u32,
        arcs: BTreeMap<AnimationId, ResourceId>,
        arc_instances: InstanceBuffer,
        ripple_instances: InstanceBuffer,
        point_instances: InstanceBuffer,
        resources: ResourceRegistry<GpuResource>,
        destroyed: bool,
    }

    fn create_depth_view(
        device: &::wgpu::Device,
        config: &::wgpu::SurfaceConfiguration,
    ) -> ::wgpu::TextureView {
        let tex = device.create_texture(&::wgpu::TextureDescriptor {
            label: Some("globe-depth"),
            size: ::wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        tex.create_view(&::wgpu::TextureViewDescriptor::default())
    }

    fn create_surface_texture(
        device: &::wgpu::Device,
        queue: &::wgpu::Queue,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> ::wgpu::Texture {
        let size = ::wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&::wgpu::TextureDescriptor {
            label: Some("globe-surface-texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            // Colors are already in display space; no sRGB decode on sample.
            format: ::wgpu::TextureFormat::Rgba8Unorm,
            usage: ::wgpu::TextureUsages::TEXTURE_BINDING | ::wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            ::wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: ::wgpu::Origin3d::ZERO,
                aspect: ::wgpu::TextureAspect::All,
            },
            rgba,
            ::wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        texture
    }

    fn texture_bind_group(
        device: &::wgpu::Device,
        layout: &::wgpu::BindGroupLayout,
        texture: &::wgpu::Texture,
        sampler: &::wgpu::Sampler,
    ) -> ::wgpu::BindGroup {
        let view = texture.create_view(&::wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some("globe-surface-bg"),
            layout,
            entries: &[
                ::wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ::wgpu::BindingResource::TextureView(&view),
                },
                ::wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ::wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn shader_module(device: &::wgpu::Device, label: &str, body: &str) -> ::wgpu::ShaderModule {
        device.create_shader_module(::wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: ::wgpu::ShaderSource::Wgsl(Cow::Owned(format!("{GLOBALS_WGSL}{body}"))),
        })
    }

    /// Premultiplied output composited over what is already drawn.
    fn premultiplied_blend() -> ::wgpu::BlendState {
        let component = ::wgpu::BlendComponent {
            src_factor: ::wgpu::BlendFactor::One,
            dst_factor: ::wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: ::wgpu::BlendOperation::Add,
        };
        ::wgpu::BlendState {
            color: component,
            alpha: component,
        }
    }

    struct PipelineSpec<'a> {
        label: &'a str,
        module: &'a ::wgpu::ShaderModule,
        layout: &'a ::wgpu::PipelineLayout,
        buffers: &'a [::wgpu::VertexBufferLayout<'a>],
        topology: ::wgpu::PrimitiveTopology,
        blend: ::wgpu::BlendState,
        depth_write: bool,
        depth_compare: ::wgpu::CompareFunction,
    }

    fn create_pipeline(
        device: &::wgpu::Device,
        format: ::wgpu::TextureFormat,
        spec: PipelineSpec<'_>,
    ) -> ::wgpu::RenderPipeline {
        device.create_render_pipeline(&::wgpu::RenderPipelineDescriptor {
            label: Some(spec.label),
            layout: Some(spec.layout),
            vertex: ::wgpu::VertexState {
                module: spec.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: spec.buffers,
            },
            fragment: Some(::wgpu::FragmentState {
                module: spec.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(::wgpu::ColorTargetState {
                    format,
                    blend: Some(spec.blend),
                    write_mask: ::wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: ::wgpu::PrimitiveState {
                topology: spec.topology,
                strip_index_format: None,
                front_face: ::wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: ::wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(::wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: spec.depth_write,
                depth_compare: spec.depth_compare,
                stencil: ::wgpu::StencilState::default(),
                bias: ::wgpu::DepthBiasState::default(),
            }),
            multisample: ::wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    fn attr(format: ::wgpu::VertexFormat, offset: u64, location: u32) -> ::wgpu::VertexAttribute {
        ::wgpu::VertexAttribute {
            format,
            offset,
            shader_location: location,
        }
    }

    fn sphere_vertices(mesh: &SphereMesh) -> Vec<SphereVertex> {
        mesh.positions
            .iter()
            .zip(&mesh.texcoords)
            .map(|(&position, &uv)| SphereVertex { position, uv })
            .collect()
    }

    fn arc_vertices(geometry: &ArcGeometry) -> Vec<ArcVertex> {
        geometry
            .positions
            .iter()
            .zip(&geometry.alphas)
            .zip(&geometry.progress_params)
            .map(|((&position, &alpha), &progress)| ArcVertex {
                position,
                alpha,
                progress,
            })
            .collect()
    }

    pub async fn init_wgpu_backend(
        canvas: web_sys::HtmlCanvasElement,
        sphere: &SphereMesh,
    ) -> Result<WgpuBackend, JsValue> {
        let width = canvas.width();
        let height = canvas.height();

        // The surface must not outlive its instance; keep the instance for the
        // lifetime of the page.
        let instance: &'static ::wgpu::Instance = Box::leak(Box::new(::wgpu::Instance::new(
            &::wgpu::InstanceDescriptor {
                backends: super::INSTANCE_BACKENDS,
                ..Default::default()
            },
        )));

        let surface = instance
            .create_surface(::wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(|e| JsValue::from_str(&format!("surface error: {e}")))?;

        let adapter = instance
            .request_adapter(&::wgpu::RequestAdapterOptions {
                power_preference: ::wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| JsValue::from_str(&format!("adapter error: {e}")))?;

        let (device, queue) = adapter
            .request_device(&::wgpu::DeviceDescriptor {
                label: Some("globe-wgpu-device"),
                required_features: ::wgpu::Features::empty(),
                required_limits: ::wgpu::Limits::downlevel_webgl2_defaults(),
                ..Default::default()
            })
            .await
            .map_err(|e| JsValue::from_str(&format!("device error: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .cloned()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().cloned())
            .ok_or_else(|| JsValue::from_str("surface reports no formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .cloned()
            .unwrap_or(::wgpu::CompositeAlphaMode::Auto);

        let config = ::wgpu::SurfaceConfiguration {
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            desired_maximum_frame_latency: 2,
            present_mode: ::wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        let mut resources = ResourceRegistry::new();

        let globals_buffer = device.create_buffer(&::wgpu::BufferDescriptor {
            label: Some("globe-globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: ::wgpu::BufferUsages::UNIFORM | ::wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("globe-globals-bgl"),
            entries: &[::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: ::wgpu::BindingType::Buffer {
                    ty: ::wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let globals_bind_group = device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some("globe-globals-bg"),
            layout: &globals_layout,
            entries: &[::wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("globe-surface-bgl"),
            entries: &[
                ::wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ::wgpu::ShaderStages::FRAGMENT,
                    ty: ::wgpu::BindingType::Texture {
                        sample_type: ::wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: ::wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                ::wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ::wgpu::ShaderStages::FRAGMENT,
                    ty: ::wgpu::BindingType::Sampler(::wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // U wraps across the antimeridian; V stops at the poles.
        let sampler = device.create_sampler(&::wgpu::SamplerDescriptor {
            label: Some("globe-surface-sampler"),
            address_mode_u: ::wgpu::AddressMode::Repeat,
            address_mode_v: ::wgpu::AddressMode::ClampToEdge,
            mag_filter: ::wgpu::FilterMode::Linear,
            min_filter: ::wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Blank until the first surface texture is built.
        let placeholder = create_surface_texture(&device, &queue, 1, 1, &[0, 0, 0, 0]);
        let texture_bind_group = texture_bind_group(&device, &texture_layout, &placeholder, &sampler);

        let earth_layout = device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
            label: Some("globe-earth-pipeline-layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            immediate_size: 0,
        });
        let overlay_layout = device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
            label: Some("globe-overlay-pipeline-layout"),
            bind_group_layouts: &[&globals_layout],
            immediate_size: 0,
        });

        let earth_shader = shader_module(&device, "globe-earth-shader", EARTH_SHADER);
        let arc_shader = shader_module(&device, "globe-arc-shader", ARC_SHADER);
        let ripple_shader = shader_module(&device, "globe-ripple-shader", RIPPLE_SHADER);
        let points_shader = shader_module(&device, "globe-points-shader", POINTS_SHADER);

        let earth = create_pipeline(
            &device,
            format,
            PipelineSpec {
                label: "globe-earth-pipeline",
                module: &earth_shader,
                layout: &earth_layout,
                buffers: &[::wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SphereVertex>() as ::wgpu::BufferAddress,
                    step_mode: ::wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        attr(::wgpu::VertexFormat::Float32x3, 0, 0),
                        attr(::wgpu::VertexFormat::Float32x2, 12, 1),
                    ],
                }],
                topology: ::wgpu::PrimitiveTopology::TriangleList,
                blend: ::wgpu::BlendState::REPLACE,
                depth_write: true,
                depth_compare: ::wgpu::CompareFunction::Less,
            },
        );

        let arc = create_pipeline(
            &device,
            format,
            PipelineSpec {
                label: "globe-arc-pipeline",
                module: &arc_shader,
                layout: &overlay_layout,
                buffers: &[
                    ::wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<ArcVertex>() as ::wgpu::BufferAddress,
                        step_mode: ::wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            attr(::wgpu::VertexFormat::Float32x3, 0, 0),
                            attr(::wgpu::VertexFormat::Float32, 12, 1),
                            attr(::wgpu::VertexFormat::Float32, 16, 2),
                        ],
                    },
                    ::wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<ArcInstance>() as ::wgpu::BufferAddress,
                        step_mode: ::wgpu::VertexStepMode::Instance,
                        attributes: &[
                            attr(::wgpu::VertexFormat::Float32x3, 0, 3),
                            attr(::wgpu::VertexFormat::Float32, 12, 4),
                        ],
                    },
                ],
                topology: ::wgpu::PrimitiveTopology::TriangleStrip,
                blend: premultiplied_blend(),
                depth_write: false,
                depth_compare: ::wgpu::CompareFunction::Less,
            },
        );

        let ripple = create_pipeline(
            &device,
            format,
            PipelineSpec {
                label: "globe-ripple-pipeline",
                module: &ripple_shader,
                layout: &overlay_layout,
                buffers: &[::wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<RippleInstance>() as ::wgpu::BufferAddress,
                    step_mode: ::wgpu::VertexStepMode::Instance,
                    attributes: &[
                        attr(::wgpu::VertexFormat::Float32x3, 0, 0),
                        attr(::wgpu::VertexFormat::Float32, 12, 1),
                        attr(::wgpu::VertexFormat::Float32x3, 16, 2),
                        attr(::wgpu::VertexFormat::Float32, 28, 3),
                        attr(::wgpu::VertexFormat::Float32, 32, 4),
                    ],
                }],
                topology: ::wgpu::PrimitiveTopology::TriangleStrip,
                blend: premultiplied_blend(),
                depth_write: false,
                depth_compare: ::wgpu::CompareFunction::Always,
            },
        );

        let points = create_pipeline(
            &device,
            format,
            PipelineSpec {
                label: "globe-points-pipeline",
                module: &points_shader,
                layout: &overlay_layout,
                buffers: &[::wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<PointInstance>() as ::wgpu::BufferAddress,
                    step_mode: ::wgpu::VertexStepMode::Instance,
                    attributes: &[
                        attr(::wgpu::VertexFormat::Float32x2, 0, 0),
                        attr(::wgpu::VertexFormat::Float32, 8, 1),
                        attr(::wgpu::VertexFormat::Float32x3, 12, 2),
                    ],
                }],
                topology: ::wgpu::PrimitiveTopology::TriangleStrip,
                blend: premultiplied_blend(),
                depth_write: false,
                depth_compare: ::wgpu::CompareFunction::Always,
            },
        );

        let vertices = sphere_vertices(sphere);
        let sphere_vertex_buffer = device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
            label: Some("globe-sphere-vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: ::wgpu::BufferUsages::VERTEX,
        });
        let sphere_index_buffer = device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
            label: Some("globe-sphere-indices"),
            contents: bytemuck::cast_slice(&sphere.indices),
            usage: ::wgpu::BufferUsages::INDEX,
        });

        let programs = Programs {
            earth: resources.register(ResourceKind::Program, GpuResource::Program(earth)),
            arc: resources.register(ResourceKind::Program, GpuResource::Program(arc)),
            ripple: resources.register(ResourceKind::Program, GpuResource::Program(ripple)),
            points: resources.register(ResourceKind::Program, GpuResource::Program(points)),
        };

        Ok(WgpuBackend {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            _canvas: canvas,
            depth_view,
            globals: resources.register(ResourceKind::Buffer, GpuResource::Buffer(globals_buffer)),
            globals_bind_group,
            texture_layout,
            sampler,
            texture: resources.register(ResourceKind::Texture, GpuResource::Texture(placeholder)),
            texture_bind_group,
            programs,
            sphere_vertices: resources
                .register(ResourceKind::Buffer, GpuResource::Buffer(sphere_vertex_buffer)),
            sphere_indices: resources
                .register(ResourceKind::Buffer, GpuResource::Buffer(sphere_index_buffer)),
            sphere_index_count: sphere.indices.len() as u32,
            arcs: BTreeMap::new(),
            arc_instances: InstanceBuffer::default(),
            ripple_instances: InstanceBuffer::default(),
            point_instances: InstanceBuffer::default(),
            resources,
            destroyed: false,
        })
    }

    impl WgpuBackend {
        pub fn max_texture_size(&self) -> u32 {
            self.device.limits().max_texture_dimension_2d
        }

        /// Live GPU handles, for diagnostics.
        pub fn resource_count(&self) -> usize {
            self.resources.len()
        }

        /// Replaces the surface texture, freeing the previous one.
        pub fn upload_texture(&mut self, image: &TextureImage) -> Result<(), RenderError> {
            if self.destroyed {
                return Err(RenderError::NotReady);
            }
            let expected = image.width as usize * image.height as usize * 4;
            if image.width == 0 || image.height == 0 || image.rgba.len() != expected {
                return Err(RenderError::Backend(format!(
                    "texture {}x{} has {} bytes, expected {expected}",
                    image.width,
                    image.height,
                    image.rgba.len()
                )));
            }
            let texture = create_surface_texture(
                &self.device,
                &self.queue,
                image.width,
                image.height,
                &image.rgba,
            );
            self.texture_bind_group =
                texture_bind_group(&self.device, &self.texture_layout, &texture, &self.sampler);
            let previous = std::mem::replace(
                &mut self.texture,
                self.resources
                    .register(ResourceKind::Texture, GpuResource::Texture(texture)),
            );
            if let Some(old) = self.resources.release(previous) {
                old.free();
            }
            Ok(())
        }

        fn buffer(&self, id: ResourceId) -> Option<&::wgpu::Buffer> {
            match self.resources.get(id) {
                Some(GpuResource::Buffer(b)) => Some(b),
                _ => None,
            }
        }

        fn program(&self, id: ResourceId) -> Result<&::wgpu::RenderPipeline, RenderError> {
            match self.resources.get(id) {
                Some(GpuResource::Program(p)) => Ok(p),
                _ => Err(RenderError::Backend(format!("missing program {}", id.index))),
            }
        }

        fn ensure_arc(&mut self, id: AnimationId, geometry: &ArcGeometry) {
            if self.arcs.contains_key(&id) {
                return;
            }
            let vertices = arc_vertices(geometry);
            let buffer = self
                .device
                .create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some("globe-arc-vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: ::wgpu::BufferUsages::VERTEX,
                });
            let resource = self
                .resources
                .register(ResourceKind::Buffer, GpuResource::Buffer(buffer));
            self.arcs.insert(id, resource);
        }

        fn slot(&mut self, which: InstanceSlot) -> &mut InstanceBuffer {
            match which {
                InstanceSlot::Arc => &mut self.arc_instances,
                InstanceSlot::Ripple => &mut self.ripple_instances,
                InstanceSlot::Point => &mut self.point_instances,
            }
        }

        fn write_instances<T: bytemuck::Pod>(
            &mut self,
            which: InstanceSlot,
            label: &'static str,
            data: &[T],
        ) {
            if data.is_empty() {
                return;
            }
            let bytes: &[u8] = bytemuck::cast_slice(data);
            let needed = bytes.len() as u64;
            let current = self.slot(which);
            let (stale, capacity) = (current.id, current.capacity);
            let id = match stale {
                Some(id) if capacity >= needed => id,
                _ => {
                    if let Some(old) = stale.and_then(|id| self.resources.release(id)) {
                        old.free();
                    }
                    let capacity = needed.next_power_of_two().max(256);
                    let buffer = self.device.create_buffer(&::wgpu::BufferDescriptor {
                        label: Some(label),
                        size: capacity,
                        usage: ::wgpu::BufferUsages::VERTEX | ::wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    let id = self
                        .resources
                        .register(ResourceKind::Buffer, GpuResource::Buffer(buffer));
                    let slot = self.slot(which);
                    slot.id = Some(id);
                    slot.capacity = capacity;
                    id
                }
            };
            if let Some(buffer) = self.buffer(id) {
                self.queue.write_buffer(buffer, 0, bytes);
            }
        }
    }

    impl RenderBackend for WgpuBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::WebGl
        }

        fn is_ready(&self) -> bool {
            !self.destroyed
        }

        fn update_size(&mut self, width: u32, height: u32) {
            if self.destroyed {
                return;
            }
            self.config.width = width.max(1);
            self.config.height = height.max(1);
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
        }

        fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), RenderError> {
            if self.destroyed {
                return Err(RenderError::NotReady);
            }

            let mut arcs = Vec::new();
            let mut ripples = Vec::new();
            let mut points = Vec::new();
            for cmd in &plan.commands {
                match *cmd {
                    RenderCommand::Sphere => {}
                    RenderCommand::Arc {
                        id,
                        geometry,
                        fade,
                        color,
                        ..
                    } => {
                        self.ensure_arc(id, geometry);
                        arcs.push(ArcInstance { color, fade });
                    }
                    RenderCommand::Ripple {
                        position,
                        size_px,
                        alpha,
                        ring_width,
                        color,
                        ..
                    } => ripples.push(RippleInstance {
                        center: position,
                        size_px,
                        color,
                        alpha,
                        ring_width,
                    }),
                    RenderCommand::Points { points: visible, .. } => {
                        points.extend(visible.iter().map(|p| PointInstance {
                            center: [p.x, p.y],
                            radius: p.radius,
                            color: p.color,
                        }));
                    }
                }
            }
            self.write_instances(InstanceSlot::Arc, "globe-arc-instances", &arcs);
            self.write_instances(InstanceSlot::Ripple, "globe-ripple-instances", &ripples);
            self.write_instances(InstanceSlot::Point, "globe-point-instances", &points);

            let globals = Globals {
                view_proj: plan.view_proj,
                eye: [plan.eye[0], plan.eye[1], plan.eye[2], 1.0],
                viewport: [plan.viewport[0], plan.viewport[1], 0.0, 0.0],
            };
            let globals_buffer = self
                .buffer(self.globals)
                .ok_or_else(|| RenderError::Backend("globals buffer missing".into()))?;
            self.queue
                .write_buffer(globals_buffer, 0, bytemuck::bytes_of(&globals));

            let frame = self
                .surface
                .get_current_texture()
                .map_err(|e| RenderError::SurfaceLost(e.to_string()))?;
            let view = frame
                .texture
                .create_view(&::wgpu::TextureViewDescriptor::default());

            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("globe-frame-encoder"),
                });

            {
                let mut rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                    label: Some("globe-frame-pass"),
                    color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: ::wgpu::Operations {
                            load: ::wgpu::LoadOp::Clear(::wgpu::Color::TRANSPARENT),
                            store: ::wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(::wgpu::RenderPassDepthStencilAttachment {
                        view: &self.depth_view,
                        depth_ops: Some(::wgpu::Operations {
                            load: ::wgpu::LoadOp::Clear(1.0),
                            store: ::wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
                rpass.set_bind_group(0, &self.globals_bind_group, &[]);

                let arc_stride = std::mem::size_of::<ArcInstance>() as u64;
                let ripple_stride = std::mem::size_of::<RippleInstance>() as u64;
                let (mut arc_index, mut ripple_index) = (0u64, 0u64);

                for cmd in &plan.commands {
                    match *cmd {
                        RenderCommand::Sphere => {
                            let (Some(vertices), Some(indices)) = (
                                self.buffer(self.sphere_vertices),
                                self.buffer(self.sphere_indices),
                            ) else {
                                continue;
                            };
                            rpass.set_pipeline(self.program(self.programs.earth)?);
                            rpass.set_bind_group(1, &self.texture_bind_group, &[]);
                            rpass.set_vertex_buffer(0, vertices.slice(..));
                            rpass.set_index_buffer(indices.slice(..), ::wgpu::IndexFormat::Uint16);
                            rpass.draw_indexed(0..self.sphere_index_count, 0, 0..1);
                        }
                        RenderCommand::Arc { id, vertex_count, .. } => {
                            let offset = arc_index * arc_stride;
                            arc_index += 1;
                            let vertices = self.arcs.get(&id).and_then(|r| self.buffer(*r));
                            let instances = self.arc_instances.id.and_then(|r| self.buffer(r));
                            let (Some(vertices), Some(instances)) = (vertices, instances) else {
                                continue;
                            };
                            rpass.set_pipeline(self.program(self.programs.arc)?);
                            rpass.set_vertex_buffer(0, vertices.slice(..));
                            rpass.set_vertex_buffer(1, instances.slice(offset..offset + arc_stride));
                            rpass.draw(0..vertex_count, 0..1);
                        }
                        RenderCommand::Ripple { .. } => {
                            let offset = ripple_index * ripple_stride;
                            ripple_index += 1;
                            let Some(instances) =
                                self.ripple_instances.id.and_then(|r| self.buffer(r))
                            else {
                                continue;
                            };
                            rpass.set_pipeline(self.program(self.programs.ripple)?);
                            rpass.set_vertex_buffer(
                                0,
                                instances.slice(offset..offset + ripple_stride),
                            );
                            rpass.draw(0..4, 0..1);
                        }
                        RenderCommand::Points { points: visible, .. } => {
                            let Some(instances) =
                                self.point_instances.id.and_then(|r| self.buffer(r))
                            else {
                                continue;
                            };
                            let bytes = (visible.len() * std::mem::size_of::<PointInstance>()) as u64;
                            rpass.set_pipeline(self.program(self.programs.points)?);
                            rpass.set_vertex_buffer(0, instances.slice(..bytes));
                            rpass.draw(0..4, 0..visible.len() as u32);
                        }
                    }
                }
            }

            self.queue.submit(Some(encoder.finish()));
            frame.present();
            Ok(())
        }

        fn release(&mut self, retired: &Retired) {
            for id in &retired.arcs {
                if let Some(resource) = self.arcs.remove(id).and_then(|r| self.resources.release(r)) {
                    resource.free();
                }
            }
        }

        fn destroy(&mut self) {
            if self.destroyed {
                return;
            }
            self.destroyed = true;
            self.arcs.clear();
            self.arc_instances = InstanceBuffer::default();
            self.ripple_instances = InstanceBuffer::default();
            self.point_instances = InstanceBuffer::default();
            for (_, resource) in self.resources.release_all() {
                resource.free();
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use wasm_bindgen::prelude::JsValue;

    use gpu::{BackendKind, FramePlan, RenderBackend, RenderError};
    use layers::TextureImage;
    use scene::{Retired, SphereMesh};

    #[derive(Debug, Default)]
    pub struct WgpuBackend;

    pub async fn init_wgpu_backend(
        _canvas: web_sys::HtmlCanvasElement,
        _sphere: &SphereMesh,
    ) -> Result<WgpuBackend, JsValue> {
        Err(JsValue::from_str(
            "wgpu initialization is only available on wasm32 targets",
        ))
    }

    impl WgpuBackend {
        pub fn max_texture_size(&self) -> u32 {
            2048
        }

        pub fn resource_count(&self) -> usize {
            0
        }

        pub fn upload_texture(&mut self, _image: &TextureImage) -> Result<(), RenderError> {
            Err(RenderError::NotReady)
        }
    }

    impl RenderBackend for WgpuBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::WebGl
        }

        fn is_ready(&self) -> bool {
            false
        }

        fn update_size(&mut self, _width: u32, _height: u32) {}

        fn render(&mut self, _plan: &FramePlan<'_>) -> Result<(), RenderError> {
            Err(RenderError::NotReady)
        }

        fn release(&mut self, _retired: &Retired) {}

        fn destroy(&mut self) {}
    }
}

pub use imp::{WgpuBackend, init_wgpu_backend};
