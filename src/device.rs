//! Physical device selection and logical device creation utils.
use crate::driver::Driver;
use crate::BootstrapSmallVec;
use ash::prelude::VkResult;
use ash::vk;
use std::{borrow::Cow, ffi::CStr, os::raw::c_float};
use thiserror::Error;

/// Errors that can occur during device creation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// A queue setup or device request was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Lists every physical device the instance can see, in driver order.
/// The list may be empty.
pub fn physical_devices(
    driver: &mut impl Driver,
    instance: vk::Instance,
) -> VkResult<Vec<vk::PhysicalDevice>> {
    driver.enumerate_physical_devices(instance)
}

/// Index of the first queue family whose flags contain all of `required`.
/// `None` means no family qualifies.
///
/// Families with additional capabilities are not penalized; the scan stops at
/// the first hit.
pub fn first_matching_queue_family(
    queue_family_properties: &[vk::QueueFamilyProperties],
    required: vk::QueueFlags,
) -> Option<u32> {
    queue_family_properties
        .iter()
        .position(|properties| properties.queue_flags.contains(required))
        .map(|i| i as u32)
}

/// Queries `physical_device`'s queue families and applies
/// [`first_matching_queue_family`].
pub fn queue_family_index(
    driver: &mut impl Driver,
    physical_device: vk::PhysicalDevice,
    required: vk::QueueFlags,
) -> VkResult<Option<u32>> {
    let queue_family_properties = driver.queue_family_properties(physical_device)?;
    Ok(first_matching_queue_family(
        &queue_family_properties,
        required,
    ))
}

/// How the physical device is picked out of the enumerated list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// Always the device at index 0.
    #[default]
    First,
    /// The first device whose type appears earliest in the list. Devices of
    /// unlisted types rank last; ties keep driver order.
    PrioritiseTypes(BootstrapSmallVec<vk::PhysicalDeviceType>),
}

impl DeviceSelection {
    /// Prefer discrete GPUs, then integrated ones.
    pub fn prefer_discrete() -> DeviceSelection {
        DeviceSelection::PrioritiseTypes(
            [
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
            ]
            .into_iter()
            .collect(),
        )
    }

    /// Picks one of `devices`. Returns `None` only when `devices` is empty.
    pub fn select(
        &self,
        driver: &mut impl Driver,
        devices: &[vk::PhysicalDevice],
    ) -> VkResult<Option<vk::PhysicalDevice>> {
        let types = match self {
            DeviceSelection::First => return Ok(devices.first().copied()),
            DeviceSelection::PrioritiseTypes(types) => types,
        };

        let mut ranked = BootstrapSmallVec::<(usize, vk::PhysicalDevice)>::new();
        for &physical_device in devices {
            let properties = driver.physical_device_properties(physical_device)?;
            let rank = types
                .iter()
                .position(|&preference| properties.device_type == preference)
                .unwrap_or(usize::MAX);
            ranked.push((rank, physical_device));
        }

        Ok(ranked
            .into_iter()
            .min_by_key(|&(rank, _)| rank)
            .map(|(_, physical_device)| physical_device))
    }
}

/// Setup for [`vk::Queue`] creation on one queue family.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSetup {
    /// Flags used to specify usage behavior of the queue.
    pub flags: vk::DeviceQueueCreateFlags,
    /// Index of the queue family in the queue family array.
    pub queue_family_index: u32,
    /// Specifies the amount of queues and the respective priority for each.
    pub queue_priorities: Vec<c_float>,
}

impl QueueSetup {
    /// Describes `queue_count` queues on `queue_family_index`, one priority
    /// per queue.
    pub fn new(
        queue_count: u32,
        queue_family_index: u32,
        priorities: &[c_float],
    ) -> Result<QueueSetup, DeviceCreationError> {
        if queue_count == 0 {
            return Err(DeviceCreationError::InvalidArgument(
                "queue count must be at least 1",
            ));
        }

        if priorities.len() != queue_count as usize {
            return Err(DeviceCreationError::InvalidArgument(
                "queue priority count does not match queue count",
            ));
        }

        if priorities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(DeviceCreationError::InvalidArgument(
                "queue priorities must be within 0.0 and 1.0",
            ));
        }

        Ok(QueueSetup {
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index,
            queue_priorities: priorities.to_vec(),
        })
    }

    /// Create a new queue setup with simplified arguments.
    /// Queue priorities will all be 1.0 and all flags will be empty.
    #[inline]
    pub fn simple(queue_family_index: u32, queue_count: usize) -> QueueSetup {
        QueueSetup {
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index,
            queue_priorities: (0..queue_count).map(|_| 1.0).collect(),
        }
    }

    /// Number of queues this setup creates.
    #[inline]
    pub fn queue_count(&self) -> u32 {
        self.queue_priorities.len() as u32
    }

    #[inline]
    fn as_vulkan(&self) -> vk::DeviceQueueCreateInfoBuilder {
        vk::DeviceQueueCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(self.queue_family_index)
            .queue_priorities(&self.queue_priorities)
    }
}

/// Creates a logical device with the given queues and no features or
/// extensions enabled.
pub fn create_device(
    driver: &mut impl Driver,
    physical_device: vk::PhysicalDevice,
    queue_setups: &[QueueSetup],
) -> Result<vk::Device, DeviceCreationError> {
    if queue_setups.is_empty() {
        return Err(DeviceCreationError::InvalidArgument(
            "at least one queue setup is required",
        ));
    }

    if queue_setups.iter().any(|setup| setup.queue_priorities.is_empty()) {
        return Err(DeviceCreationError::InvalidArgument(
            "queue setups must create at least one queue",
        ));
    }

    let queue_create_infos: BootstrapSmallVec<_> = queue_setups
        .iter()
        .map(QueueSetup::as_vulkan)
        .map(|x| x.build())
        .collect();
    let device_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_create_infos);

    Ok(driver.create_device(physical_device, &device_info)?)
}

/// [`create_device`] for a single queue family.
#[inline]
pub fn create_device_single(
    driver: &mut impl Driver,
    physical_device: vk::PhysicalDevice,
    queue_setup: &QueueSetup,
) -> Result<vk::Device, DeviceCreationError> {
    create_device(driver, physical_device, std::slice::from_ref(queue_setup))
}

/// Releases `device`. Must be called exactly once per created device,
/// before its instance is destroyed.
pub fn destroy_device(driver: &mut impl Driver, device: vk::Device) {
    driver.destroy_device(device);
}

/// Metadata for after device creation.
#[derive(Debug, Clone)]
pub struct DeviceMetadata {
    device_handle: vk::Device,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    queue_setups: BootstrapSmallVec<QueueSetup>,
    queue_family_properties: Vec<vk::QueueFamilyProperties>,
}

impl DeviceMetadata {
    pub(crate) fn new(
        device_handle: vk::Device,
        physical_device: vk::PhysicalDevice,
        properties: vk::PhysicalDeviceProperties,
        queue_setups: BootstrapSmallVec<QueueSetup>,
        queue_family_properties: Vec<vk::QueueFamilyProperties>,
    ) -> DeviceMetadata {
        DeviceMetadata {
            device_handle,
            physical_device,
            properties,
            queue_setups,
            queue_family_properties,
        }
    }

    /// The device this metadata belongs to.
    #[inline]
    pub fn device_handle(&self) -> vk::Device {
        self.device_handle
    }

    /// The physical device this device belongs to.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Properties of the physical device.
    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Name of the physical device.
    #[inline]
    pub fn device_name(&self) -> Cow<str> {
        device_name(&self.properties)
    }

    /// Type of the physical device.
    #[inline]
    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.properties.device_type
    }

    /// The queue setups which are in use.
    #[inline]
    pub fn queue_setups(&self) -> &[QueueSetup] {
        &self.queue_setups
    }

    /// The queue family properties of the physical device.
    #[inline]
    pub fn queue_family_properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_family_properties
    }
}

pub(crate) fn device_name(properties: &vk::PhysicalDeviceProperties) -> Cow<str> {
    let raw = &properties.device_name;
    if raw.contains(&0) {
        unsafe { CStr::from_ptr(raw.as_ptr()).to_string_lossy() }
    } else {
        Cow::Borrowed("<unnamed device>")
    }
}
