mod common;

use lumen_rhi::{
    create_device, ColorAttachment, CommandListKind, Device, DeviceCapabilities, DeviceDesc, GraphicsApi,
    RenderPassDesc, ResourceState, RhiError, Swapchain, SwapchainDesc, SwapchainDescBuilder, ValidationKind,
};

fn render_frame(device: &dyn Device, swapchain: &mut dyn Swapchain, return_to_present: bool) -> u32 {
    let index = swapchain.begin_frame().unwrap();
    let handle = device.create_command_list(CommandListKind::Graphics, "frame").unwrap();
    {
        let back_buffer = swapchain.current_back_buffer();
        let mut list = handle.lock();
        list.begin();
        list.texture_barrier(back_buffer, ResourceState::Present, ResourceState::RenderTarget);
        list.begin_render_pass(&RenderPassDesc::new().with_color(ColorAttachment::clear(back_buffer, [0.0, 0.0, 1.0, 1.0])));
        list.end_render_pass();
        if return_to_present {
            list.texture_barrier(back_buffer, ResourceState::RenderTarget, ResourceState::Present);
        }
        list.end();
    }
    device.submit(&handle).unwrap();
    swapchain.present().unwrap();
    index
}

#[test]
fn back_buffers_cycle_on_present() {
    let device = common::validated_device();
    let desc = SwapchainDescBuilder::default().debug_name("main").width(64).height(32).buffer_count(3).build().unwrap();
    let mut swapchain = device.create_swapchain(&desc).unwrap();
    assert_eq!(swapchain.extent(), (64, 32));

    let indices: Vec<_> = (0..4).map(|_| render_frame(&*device, &mut *swapchain, true)).collect();
    device.wait_idle().unwrap();

    assert_eq!(indices, vec![0, 1, 2, 0]);
    assert_eq!(device.queue_stats().presents, 4);
    assert!(device.take_validation_messages().is_empty());
}

#[test]
fn presenting_a_render_target_is_reported() {
    let device = common::validated_device();
    let mut swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();

    render_frame(&*device, &mut *swapchain, false);
    device.wait_idle().unwrap();

    let messages = device.take_validation_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, ValidationKind::PresentState);
    assert_eq!(messages[0].command_list, None);
    assert_eq!(messages[0].resource, Some(swapchain.back_buffer(0).id()));
}

#[test]
fn resize_recreates_back_buffers() {
    let device = common::plain_device();
    let mut swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();
    let old_id = swapchain.back_buffer(0).id();

    render_frame(&*device, &mut *swapchain, true);
    device.wait_idle().unwrap();
    swapchain.resize(320, 200).unwrap();

    assert_eq!(swapchain.extent(), (320, 200));
    assert_eq!(swapchain.current_back_buffer_index(), 0);
    assert_ne!(swapchain.back_buffer(0).id(), old_id);
    assert_eq!(swapchain.back_buffer(1).extent(), (320, 200));
    assert!(matches!(swapchain.resize(0, 200), Err(RhiError::SwapchainOutOfDate)));
}

#[test]
fn invalid_swapchain_descriptors_are_rejected() {
    let device = common::plain_device();
    let one_buffer = SwapchainDesc { buffer_count: 1, ..Default::default() };
    let empty = SwapchainDesc { width: 0, ..Default::default() };
    for desc in [one_buffer, empty] {
        assert!(matches!(device.create_swapchain(&desc).map(|_| ()), Err(RhiError::InvalidDescriptor(_))));
    }
}

#[test]
fn extents_beyond_the_texture_limit_are_rejected() {
    common::init_logging();
    let desc = DeviceDesc {
        api: GraphicsApi::Software,
        capabilities: DeviceCapabilities { max_texture_dimension: 256, ..Default::default() },
        ..Default::default()
    };
    let device = create_device(&desc).unwrap();

    let too_wide = SwapchainDesc { width: 257, height: 64, ..Default::default() };
    assert!(matches!(device.create_swapchain(&too_wide).map(|_| ()), Err(RhiError::InvalidDescriptor(_))));

    let at_limit = SwapchainDesc { width: 256, height: 256, ..Default::default() };
    let mut swapchain = device.create_swapchain(&at_limit).unwrap();
    let old_id = swapchain.back_buffer(0).id();

    assert!(matches!(swapchain.resize(128, 512), Err(RhiError::InvalidDescriptor(_))));
    assert_eq!(swapchain.extent(), (256, 256));
    assert_eq!(swapchain.back_buffer(0).id(), old_id);

    swapchain.resize(128, 256).unwrap();
    assert_eq!(swapchain.extent(), (128, 256));
}
