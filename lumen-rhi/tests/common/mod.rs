#![allow(dead_code)]

use std::sync::Arc;
use lumen_rhi::{create_device, Device, DeviceDesc, GraphicsApi};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Software device with the validation layer on.
pub fn validated_device() -> Arc<dyn Device> {
    device(true)
}

/// Software device without the validation layer.
pub fn plain_device() -> Arc<dyn Device> {
    device(false)
}

fn device(validation: bool) -> Arc<dyn Device> {
    init_logging();
    let desc = DeviceDesc {
        debug_name: "test-device".to_string(),
        api: GraphicsApi::Software,
        enable_validation: validation,
        enable_gpu_validation: validation,
        ..Default::default()
    };
    create_device(&desc).expect("software device")
}

pub fn read_buffer(buffer: &dyn lumen_rhi::Buffer) -> Vec<u8> {
    let mut data = vec![0u8; buffer.size() as usize];
    buffer.read(0, &mut data).expect("readback buffer");
    data
}
