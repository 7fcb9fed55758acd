// Buffer utilities: raw memory allocation and staged uploads
//
// The vertex buffer lives in device-local memory. Data reaches it through a
// host-visible staging buffer and a single copy command.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

/// A buffer together with the memory bound to it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Helper to create a GPU buffer with specified usage and memory properties
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<GpuBuffer> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device.device.create_buffer(&buffer_info, None)
            .context("Failed to create buffer")?
    };

    let mem_requirements = unsafe {
        device.device.get_buffer_memory_requirements(buffer)
    };
    log::debug!("Buffer ({:?}) requires {} bytes", usage, mem_requirements.size);

    let memory_type_index = find_memory_type(
        &device.memory_properties,
        mem_requirements.memory_type_bits,
        memory_properties,
    )?;
    log::debug!("Memory type index {} for {:?}", memory_type_index, memory_properties);

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device.device.allocate_memory(&alloc_info, None)
            .context("Failed to allocate buffer memory")?
    };

    unsafe {
        device.device.bind_buffer_memory(buffer, memory, 0)
            .context("Failed to bind buffer memory")?;
    }

    Ok(GpuBuffer { buffer, memory, size })
}

/// Upload `data` into a new device-local buffer.
///
/// `copy_cmd` is recorded with the one copy, submitted on `queue`, and the
/// queue is drained before the staging buffer is released.
pub fn create_device_local_buffer<T: Copy>(
    device: &VulkanDevice,
    queue: vk::Queue,
    copy_cmd: vk::CommandBuffer,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<GpuBuffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;
    if size == 0 {
        anyhow::bail!("Refusing to create an empty buffer");
    }

    let staging = create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe {
        let ptr = device.device.map_memory(
            staging.memory,
            0,
            size,
            vk::MemoryMapFlags::empty(),
        ).context("Failed to map staging memory")? as *mut T;

        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        device.device.unmap_memory(staging.memory);
    }

    let target = create_buffer(
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    unsafe {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.device.begin_command_buffer(copy_cmd, &begin_info)
            .context("Failed to begin copy command buffer")?;

        let region = vk::BufferCopy::builder().size(size).build();
        device.device.cmd_copy_buffer(copy_cmd, staging.buffer, target.buffer, &[region]);

        device.device.end_command_buffer(copy_cmd)
            .context("Failed to end copy command buffer")?;

        let command_buffers = [copy_cmd];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        device.device.queue_submit(queue, &[submit_info.build()], vk::Fence::null())
            .context("Failed to submit buffer copy")?;
        device.device.queue_wait_idle(queue)
            .context("Failed waiting for buffer copy")?;
    }

    staging.destroy(&device.device);
    log::info!("Uploaded {} bytes to device-local memory", target.size);

    Ok(target)
}

/// Find the first memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..mem_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    anyhow::bail!(
        "Failed to find memory type with {:?} (allowed types {:#b})",
        properties,
        type_filter
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn picks_first_matching_type() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn respects_requirement_bits() {
        let props = memory_properties(&[HOST, HOST]);
        assert_eq!(find_memory_type(&props, 0b10, HOST).unwrap(), 1);
    }

    #[test]
    fn needs_every_requested_flag() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        assert!(find_memory_type(&props, 0b1, HOST).is_err());
    }

    #[test]
    fn ignores_types_past_the_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = HOST;
        assert!(find_memory_type(&props, 0b11, HOST).is_err());
    }
}
