//! Demo scene for the trellis engine: a spinning cube, a ground grid, axis
//! lines and a trail that is rebuilt every few seconds.

mod camera;
mod geometry;

use std::f32::consts::TAU;
use std::sync::Arc;

use anyhow::Context;
use glam::{Quat, Vec3};
use trellis_engine::core::{App, AppControl, FrameCtx};
use trellis_engine::device::{Gpu, GpuInit};
use trellis_engine::logging::{init_logging, LoggingConfig};
use trellis_engine::render::{ShaderProgram, VertexData};
use trellis_engine::scene::{Mesh, MeshId, Renderer};
use trellis_engine::window::{Runtime, RuntimeConfig};

use camera::OrbitCamera;

/// Seconds between trail resets.
const TRAIL_LIFETIME: f32 = 6.0;

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.06,
    g: 0.07,
    b: 0.09,
    a: 1.0,
};

#[derive(Default)]
struct Viewer {
    renderer: Renderer,
    shader: Option<Arc<ShaderProgram>>,
    camera: OrbitCamera,
    cube: Option<MeshId>,
    trail: Option<MeshId>,
    trail_started: f32,
}

impl Viewer {
    fn spawn(&mut self, mut mesh: Mesh) -> Option<MeshId> {
        let shader = self.shader.clone()?;
        mesh.set_shader_program(shader);
        Some(self.renderer.add(mesh))
    }

    fn respawn_trail(&mut self, now: f32) {
        if let Some(old) = self.trail.take() {
            self.renderer.remove(old);
        }
        self.trail = self.spawn(Mesh::with_buffer(geometry::trail()));
        self.trail_started = now;
    }

    fn animate(&mut self, t: f32) {
        if let Some(cube) = self.cube.and_then(|id| self.renderer.mesh_mut(id)) {
            cube.set_rotation(Quat::from_rotation_y(t * 0.8) * Quat::from_rotation_x(t * 0.5));
            cube.set_position(Vec3::new(0.0, 1.0 + 0.25 * (t * 1.7).sin(), 0.0));
        }

        if t - self.trail_started > TRAIL_LIFETIME {
            self.respawn_trail(t);
        }

        if let Some(trail) = self
            .trail
            .and_then(|id| self.renderer.mesh_mut(id))
            .and_then(|m| m.buffer_mut::<VertexData>())
        {
            let a = t * 1.3;
            let p = Vec3::new(2.5 * a.cos(), 0.05 + 0.5 * (a * 3.0).sin().abs(), 2.5 * a.sin());
            let hue = (t - self.trail_started) / TRAIL_LIFETIME;
            trail.add_vertex(VertexData::from_glam(
                p,
                Vec3::ZERO,
                Vec3::new(1.0, hue, 1.0 - hue).extend(1.0),
            ));
        }
    }
}

impl App for Viewer {
    fn on_gpu_ready(&mut self, gpu: &Gpu<'_>) -> anyhow::Result<()> {
        let shader = ShaderProgram::basic(gpu.device()).context("loading basic shader")?;
        self.shader = Some(Arc::new(shader));

        self.spawn(Mesh::with_buffer(geometry::grid(10, 0.5)));

        let mut axes = Mesh::with_buffer(geometry::axes(1.5));
        axes.set_position(Vec3::new(0.0, 0.01, 0.0));
        self.spawn(axes);

        // Pivot on the bottom face so scaling keeps it resting on its base.
        let mut cube = Mesh::with_buffer(geometry::cube(1.0));
        cube.set_origin(Vec3::new(0.0, 0.5, 0.0));
        self.cube = self.spawn(cube);

        self.respawn_trail(0.0);
        log::info!("scene ready: {} meshes", self.renderer.len());
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let t = ctx.time.elapsed;
        self.animate(t);

        let global = self
            .camera
            .view_projection((t * 0.1) % TAU, ctx.aspect_ratio());

        let renderer = &mut self.renderer;
        ctx.render(CLEAR, |rctx, target| renderer.render(rctx, target, global))
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    Runtime::run(
        RuntimeConfig {
            title: "trellis viewer".to_string(),
            ..RuntimeConfig::default()
        },
        GpuInit::default(),
        Viewer::default(),
    )
}
