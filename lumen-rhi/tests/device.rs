mod common;

use lumen_rhi::{
    create_device, BufferDesc, BufferUsage, CommandListKind, ComputePipelineDesc, DeviceDesc, DeviceDescBuilder,
    Format, GraphicsApi, GraphicsPipelineDesc, ResourceState, RhiError, ShaderDesc, ShaderModel, ShaderType,
    TextureDesc, ValidationKind, MAX_FRAMES_IN_FLIGHT,
};

const BYTECODE: &[u8] = &[0x03, 0x02, 0x23, 0x07];

#[test]
fn auto_picks_the_software_backend() {
    common::init_logging();
    let device = create_device(&DeviceDesc::default()).unwrap();
    assert_eq!(device.api(), GraphicsApi::Software);
    assert_eq!(device.frame_count(), 2);
}

#[test]
fn unavailable_backends_fail_explicitly() {
    common::init_logging();
    for api in [GraphicsApi::DirectX12, GraphicsApi::Vulkan, GraphicsApi::None] {
        let desc = DeviceDesc { api, ..Default::default() };
        match create_device(&desc) {
            Err(RhiError::BackendUnavailable(reported)) => assert_eq!(reported, api),
            other => panic!("{:?} should be unavailable, got {:?}", api, other.map(|d| d.api())),
        }
    }
}

#[test]
fn frame_count_outside_bounds_is_rejected() {
    common::init_logging();
    for frame_buffer_count in [0, MAX_FRAMES_IN_FLIGHT + 1] {
        let desc = DeviceDescBuilder::default()
            .api(GraphicsApi::Software)
            .frame_buffer_count(frame_buffer_count)
            .build()
            .unwrap();
        assert!(matches!(create_device(&desc), Err(RhiError::InvalidDescriptor(_))));
    }
}

#[test]
fn empty_list_is_a_no_op() {
    let device = common::validated_device();
    let readback = device.create_buffer(&BufferDesc::readback("untouched", 16)).unwrap();

    let handle = device.create_command_list(CommandListKind::Graphics, "empty").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.end();
    }
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();

    let stats = device.queue_stats();
    assert_eq!(stats.command_lists, 1);
    assert_eq!((stats.draws, stats.dispatches, stats.copies, stats.barriers), (0, 0, 0, 0));
    assert!(device.take_validation_messages().is_empty());
    assert_eq!(common::read_buffer(&*readback), vec![0; 16]);
}

#[test]
fn frame_index_wraps_after_frame_count_frames() {
    common::init_logging();
    let desc = DeviceDesc { api: GraphicsApi::Software, frame_buffer_count: 3, ..Default::default() };
    let device = create_device(&desc).unwrap();

    let start = device.current_frame_index();
    let mut seen = Vec::new();
    for _ in 0..device.frame_count() {
        seen.push(device.begin_frame().unwrap());
        device.end_frame().unwrap();
    }
    assert_eq!(device.current_frame_index(), start);
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn begin_frame_waits_for_the_reused_slot() {
    common::init_logging();
    let desc = DeviceDesc { api: GraphicsApi::Software, frame_buffer_count: 1, ..Default::default() };
    let device = create_device(&desc).unwrap();
    let src = device.create_buffer(&BufferDesc::upload("src", 4)).unwrap();
    let dst = device.create_buffer(&BufferDesc::readback("dst", 4)).unwrap();
    src.write(0, &[7, 7, 7, 7]).unwrap();

    assert_eq!(device.begin_frame(), Ok(0));
    let handle = device.create_command_list(CommandListKind::Copy, "copy").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.copy_buffer(&*src, 0, &*dst, 0, 4);
        list.end();
    }
    device.submit(&handle).unwrap();
    device.end_frame().unwrap();

    // The single slot is reused, so its previous frame must be complete.
    assert_eq!(device.begin_frame(), Ok(0));
    assert_eq!(device.queue_stats().copies, 1);
    assert_eq!(common::read_buffer(&*dst), vec![7, 7, 7, 7]);
}

#[test]
fn fences_order_cpu_after_gpu_work() {
    let device = common::validated_device();
    let fence = device.create_fence(0).unwrap();
    let upload = device.create_buffer(&BufferDesc::upload("upload", 8)).unwrap();
    let vertices = device.create_buffer(&BufferDesc::vertex("vertices", 8)).unwrap();
    let readback = device.create_buffer(&BufferDesc::readback("readback", 8)).unwrap();
    upload.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let handle = device.create_command_list(CommandListKind::Copy, "upload").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.buffer_barrier(&*vertices, ResourceState::Common, ResourceState::CopyDest);
        list.copy_buffer(&*upload, 0, &*vertices, 0, 8);
        list.buffer_barrier(&*vertices, ResourceState::CopyDest, ResourceState::CopySource);
        list.copy_buffer(&*vertices, 4, &*readback, 0, 4);
        list.copy_buffer(&*vertices, 0, &*readback, 4, 4);
        list.end();
    }
    device.submit(&handle).unwrap();
    device.signal_fence(&*fence, 1).unwrap();
    device.wait_fence(&*fence, 1).unwrap();

    assert!(fence.is_complete(1));
    assert_eq!(common::read_buffer(&*readback), vec![5, 6, 7, 8, 1, 2, 3, 4]);
    assert!(device.take_validation_messages().is_empty());
}

#[test]
fn cpu_signals_are_monotonic() {
    let device = common::plain_device();
    let fence = device.create_fence(3).unwrap();
    assert_eq!(fence.completed_value(), 3);
    fence.signal(1);
    assert_eq!(fence.completed_value(), 3);
    fence.signal(4);
    device.wait_fence(&*fence, 4).unwrap();
    assert_eq!(fence.completed_value(), 4);
}

#[test]
fn copy_into_a_sampled_texture_needs_copy_dest() {
    let device = common::validated_device();
    let texture = device.create_texture(&TextureDesc::new_2d("albedo", 2, 2, Format::R32Uint)).unwrap();
    let upload = device.create_buffer(&BufferDesc::upload("texels", 16)).unwrap();
    let readback = device.create_buffer(&BufferDesc::readback("readback", 16)).unwrap();
    let texels: Vec<u8> = (0u32..4).flat_map(|v| v.to_le_bytes()).collect();
    upload.write(0, &texels).unwrap();

    let handle = device.create_command_list(CommandListKind::Copy, "texture upload").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.copy_buffer_to_texture(&*upload, 0, &*texture);
        list.texture_barrier(&*texture, ResourceState::Undefined, ResourceState::CopyDest);
        list.copy_buffer_to_texture(&*upload, 0, &*texture);
        list.texture_barrier(&*texture, ResourceState::CopyDest, ResourceState::CopySource);
        list.copy_texture_to_buffer(&*texture, &*readback, 0);
        list.end();
    }
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();

    let messages = device.take_validation_messages();
    assert_eq!(messages.len(), 1, "{:?}", messages);
    assert_eq!(messages[0].kind, ValidationKind::CopyState);
    assert_eq!(common::read_buffer(&*readback), texels);
}

#[test]
fn factories_reject_invalid_descriptors() {
    let device = common::plain_device();
    let invalid = |result: Result<(), RhiError>| matches!(result, Err(RhiError::InvalidDescriptor(_)));

    assert!(invalid(device.create_buffer(&BufferDesc::vertex("empty", 0)).map(|_| ())));
    assert!(invalid(
        device.create_buffer(&BufferDesc::vertex("huge", device.capabilities().max_buffer_size + 1)).map(|_| ())
    ));
    assert!(invalid(device.create_texture(&TextureDesc::new_2d("huge", 1 << 20, 4, Format::Rgba8Unorm)).map(|_| ())));
    assert!(invalid(device.create_shader(&ShaderDesc::new("empty", ShaderType::Pixel, &[])).map(|_| ())));
    assert!(invalid(device.create_shader(&ShaderDesc::new("mesh", ShaderType::Mesh, BYTECODE)).map(|_| ())));
    assert!(invalid(
        device
            .create_shader(
                &ShaderDesc::new("future", ShaderType::Pixel, BYTECODE)
                    .with_shader_model(ShaderModel { major: 7, minor: 0 })
            )
            .map(|_| ())
    ));

    let cs = device.create_shader(&ShaderDesc::new("cs", ShaderType::Compute, BYTECODE)).unwrap();
    assert!(invalid(device.create_graphics_pipeline(&GraphicsPipelineDesc::new("wrong stage", &*cs)).map(|_| ())));
    assert!(device.create_compute_pipeline(&ComputePipelineDesc::new("ok", &*cs)).is_ok());
}

#[test]
fn cpu_access_outside_the_descriptor_is_an_error() {
    let device = common::plain_device();
    let gpu_only = device.create_buffer(&BufferDesc::new("gpu", 16, BufferUsage::Storage)).unwrap();
    assert!(matches!(gpu_only.write(0, &[0; 4]), Err(RhiError::InvalidUsage(_))));
    assert!(matches!(gpu_only.read(0, &mut [0; 4]), Err(RhiError::InvalidUsage(_))));
}

#[test]
fn dispatch_counts_thread_groups_and_checks_the_pipeline() {
    let device = common::validated_device();
    let cs = device.create_shader(&ShaderDesc::new("cs", ShaderType::Compute, BYTECODE)).unwrap();
    let pipeline = device.create_compute_pipeline(&ComputePipelineDesc::new("cull", &*cs)).unwrap();

    let handle = device.create_command_list(CommandListKind::Compute, "compute").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.dispatch(1, 1, 1);
        list.set_pipeline(&*pipeline);
        list.dispatch(4, 2, 1);
        list.end();
    }
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();

    let stats = device.queue_stats();
    assert_eq!(stats.dispatches, 2);
    assert_eq!(stats.thread_groups, 9);
    let kinds: Vec<_> = device.take_validation_messages().into_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![ValidationKind::MissingState]);
}

#[test]
fn submissions_execute_in_call_order() {
    let device = common::plain_device();
    let a = device.create_buffer(&BufferDesc::upload("a", 4)).unwrap();
    let b = device.create_buffer(&BufferDesc::upload("b", 4)).unwrap();
    let out = device.create_buffer(&BufferDesc::readback("out", 4)).unwrap();
    a.write(0, &[1; 4]).unwrap();
    b.write(0, &[2; 4]).unwrap();

    for (name, src) in [("first", &a), ("second", &b)] {
        let handle = device.create_command_list(CommandListKind::Copy, name).unwrap();
        {
            let mut list = handle.lock();
            list.begin();
            list.copy_buffer(&**src, 0, &*out, 0, 4);
            list.end();
        }
        device.submit(&handle).unwrap();
    }
    device.wait_idle().unwrap();
    assert_eq!(common::read_buffer(&*out), vec![2; 4]);
}

#[test]
fn dispatches_at_the_group_limit_keep_the_queue_alive() {
    let device = common::plain_device();
    let limit = device.capabilities().max_dispatch_group_count;
    let cs = device.create_shader(&ShaderDesc::new("cs", ShaderType::Compute, BYTECODE)).unwrap();
    let pipeline = device.create_compute_pipeline(&ComputePipelineDesc::new("wide", &*cs)).unwrap();

    let handle = device.create_command_list(CommandListKind::Compute, "wide").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.set_pipeline(&*pipeline);
        for _ in 0..3 {
            list.dispatch(limit, limit, limit);
        }
        list.end();
    }
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();

    let per_dispatch = (limit as u64).pow(3);
    assert_eq!(device.queue_stats().thread_groups, 3 * per_dispatch);
    assert_eq!(device.begin_frame(), Ok(0));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "exceeds the device limit")]
fn oversized_dispatch_asserts() {
    let device = common::plain_device();
    let handle = device.create_command_list(CommandListKind::Compute, "oversized").unwrap();
    let mut list = handle.lock();
    list.begin();
    list.dispatch(u32::MAX, u32::MAX, 2);
}

#[cfg(not(debug_assertions))]
#[test]
fn oversized_dispatch_saturates_instead_of_losing_the_device() {
    let device = common::plain_device();
    let handle = device.create_command_list(CommandListKind::Compute, "oversized").unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.dispatch(u32::MAX, u32::MAX, 2);
        list.end();
    }
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();
    assert_eq!(device.queue_stats().thread_groups, u64::MAX);

    device.end_frame().unwrap();
    assert!(device.begin_frame().is_ok());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "without reset")]
fn begin_while_recording_asserts() {
    let device = common::plain_device();
    let handle = device.create_command_list(CommandListKind::Graphics, "twice").unwrap();
    let mut list = handle.lock();
    list.begin();
    list.begin();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "submitted in Recording state")]
fn submitting_an_open_list_asserts() {
    let device = common::plain_device();
    let handle = device.create_command_list(CommandListKind::Graphics, "open").unwrap();
    handle.lock().begin();
    let _ = device.submit(&handle);
}

#[cfg(not(debug_assertions))]
#[test]
fn open_lists_are_skipped_on_submit() {
    let device = common::plain_device();
    let handle = device.create_command_list(CommandListKind::Graphics, "open").unwrap();
    handle.lock().begin();
    device.submit(&handle).unwrap();
    device.wait_idle().unwrap();
    assert_eq!(device.queue_stats().command_lists, 0);
    assert_eq!(handle.lock().status(), lumen_rhi::CommandListStatus::Recording);
}

#[test]
fn destroyed_resources_stop_being_tracked() {
    let device = common::validated_device();
    let kept = device.create_buffer(&BufferDesc::vertex("kept", 16)).unwrap();

    for frame in 0..64 {
        let scratch = device.create_buffer(&BufferDesc::vertex("scratch", 16)).unwrap();
        let handle = device.create_command_list(CommandListKind::Copy, "transitions").unwrap();
        {
            let mut list = handle.lock();
            list.begin();
            list.buffer_barrier(&*scratch, ResourceState::Common, ResourceState::CopyDest);
            if frame == 0 {
                list.buffer_barrier(&*kept, ResourceState::Common, ResourceState::CopyDest);
            }
            list.end();
        }
        device.submit(&handle).unwrap();
    }
    // Destruction is reported behind the work that last used the resource.
    device.wait_idle().unwrap();
    device.wait_idle().unwrap();

    assert_eq!(device.queue_stats().tracked_resources, 1);
    assert!(device.take_validation_messages().is_empty());
    drop(kept);
    device.wait_idle().unwrap();
    assert_eq!(device.queue_stats().tracked_resources, 0);
}
