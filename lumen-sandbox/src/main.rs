use std::thread;
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use lumen_core::cli::CommonArgs;
use lumen_rhi::{
    create_device, ColorAttachment, CommandListPool, CommandListPoolDesc, DeviceDescBuilder, Format,
    GraphicsPipelineDesc, ParallelCommandContext, Pipeline, RenderPassDesc, ResourceState, ScissorRect, ShaderDesc,
    ShaderType, SwapchainDescBuilder, Texture, Viewport,
};

// The software backend never interprets bytecode.
const VS_BYTECODE: &[u8] = b"lumen.fullscreen.vs";
const PS_BYTECODE: &[u8] = b"lumen.flat.ps";

const CLEAR_COLOR: [f32; 4] = [0.2, 0.3, 0.8, 1.0];
const DRAWS_PER_WORKER: u32 = 16;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct SandboxArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of frames to render
    #[arg(long, default_value_t = 8)]
    frames: u32,

    /// Worker threads recording draws each frame
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Frames the CPU may record ahead of the GPU
    #[arg(long, default_value_t = 2)]
    frames_in_flight: u32,

    /// Command lists each per-frame pool may grow to
    #[arg(long, default_value_t = 8)]
    pool_size: usize,

    /// Disable the backend validation layer
    #[arg(long)]
    no_validation: bool,
}

fn main() -> anyhow::Result<()> {
    let args = SandboxArgs::parse();
    args.common.init_logging()?;

    let device_desc = DeviceDescBuilder::default()
        .debug_name("sandbox")
        .frame_buffer_count(args.frames_in_flight)
        .enable_validation(!args.no_validation)
        .enable_gpu_validation(!args.no_validation)
        .build()?;
    let device = create_device(&device_desc).context("Failed to create the render device")?;

    let swapchain_desc = SwapchainDescBuilder::default()
        .debug_name("sandbox.swapchain")
        .width(640)
        .height(360)
        .format(Format::Bgra8Unorm)
        .build()?;
    let mut swapchain = device.create_swapchain(&swapchain_desc)?;

    let vertex_shader = device.create_shader(&ShaderDesc::new("fullscreen.vs", ShaderType::Vertex, VS_BYTECODE))?;
    let pixel_shader = device.create_shader(&ShaderDesc::new("flat.ps", ShaderType::Pixel, PS_BYTECODE))?;
    let pipeline = device.create_graphics_pipeline(
        &GraphicsPipelineDesc::new("flat", &*vertex_shader)
            .with_pixel_shader(&*pixel_shader)
            .with_color(swapchain_desc.format),
    )?;

    // One pool per frame slot: a slot's pool is only reset once the GPU is done with it.
    let lists_per_frame = args.workers + 2;
    let pools = (0..device.frame_count())
        .map(|slot| {
            let desc = CommandListPoolDesc::new(
                &format!("frame{}", slot),
                lists_per_frame.min(args.pool_size),
                args.pool_size,
            );
            device.create_command_list_pool(&desc)
        })
        .collect::<Result<Vec<CommandListPool>, _>>()?;

    info!(
        "Rendering {} frames with {} workers, {} frames in flight",
        args.frames, args.workers, device.frame_count()
    );

    for frame in 0..args.frames {
        profiling::scope!("frame");

        let slot = device.begin_frame()?;
        let pool = &pools[slot];
        pool.reset();

        let back_buffer_index = swapchain.begin_frame()?;
        let context = ParallelCommandContext::new(pool);
        record_frame(&context, swapchain.current_back_buffer(), &*pipeline, args.workers)?;
        log::debug!(
            "Frame {} (slot {}, back buffer {}): {} command lists",
            frame, slot, back_buffer_index, context.populated_count()
        );

        device.submit_parallel(context)?;
        swapchain.present()?;
        device.end_frame()?;

        profiling::finish_frame!();
    }

    device.wait_idle()?;

    let stats = device.queue_stats();
    info!(
        "Executed {} command lists: {} draws, {} render passes, {} barriers, {} presents",
        stats.command_lists, stats.draws, stats.render_passes, stats.barriers, stats.presents
    );
    let messages = device.take_validation_messages();
    for message in &messages {
        warn!("{}", message);
    }
    if !messages.is_empty() {
        anyhow::bail!("Validation reported {} issues", messages.len());
    }

    Ok(())
}

/// Slot 0 clears the back buffer, slots `1..=workers` draw, and the last slot returns it
/// to `Present`. Submission follows slot order no matter which thread finishes first.
fn record_frame(
    context: &ParallelCommandContext<'_>,
    target: &dyn Texture,
    pipeline: &dyn Pipeline,
    workers: usize,
) -> anyhow::Result<()> {
    thread::scope(|scope| -> anyhow::Result<()> {
        for worker in 1..=workers {
            scope.spawn(move || record_draws(context, worker, target, pipeline));
        }

        let open = context.get_command_list(0).context("Command list pool exhausted")?;
        {
            let mut list = open.lock();
            list.begin_event("clear");
            list.texture_barrier(target, ResourceState::Present, ResourceState::RenderTarget);
            list.begin_render_pass(&RenderPassDesc::new().with_color(ColorAttachment::clear(target, CLEAR_COLOR)));
            list.end_render_pass();
            list.end_event();
        }

        let close = context.get_command_list(workers + 1).context("Command list pool exhausted")?;
        close.lock().texture_barrier(target, ResourceState::RenderTarget, ResourceState::Present);

        Ok(())
    })
}

fn record_draws(context: &ParallelCommandContext<'_>, worker: usize, target: &dyn Texture, pipeline: &dyn Pipeline) {
    profiling::scope!("record_draws");

    let Some(handle) = context.get_command_list(worker) else {
        warn!("Worker {} found the command list pool exhausted, skipping its draws", worker);
        return;
    };

    let (width, height) = target.extent();
    let mut list = handle.lock();
    list.begin_event(&format!("worker {}", worker));
    list.begin_render_pass(&RenderPassDesc::new().with_color(ColorAttachment::load(target)));
    list.set_pipeline(pipeline);
    list.set_viewport(Viewport::new(width as f32, height as f32));
    list.set_scissor(ScissorRect::new(width, height));
    for draw in 0..DRAWS_PER_WORKER {
        list.draw(3, draw * 3);
    }
    list.end_render_pass();
    list.end_event();
}
