//! The Vulkan entry points the bootstrap sequence relies on.
//!
//! Everything in this crate talks to the driver through [`Driver`], which
//! keeps the bootstrap logic independent of a live Vulkan loader. The
//! production implementation is [`AshDriver`].
// `DebugReport` is deprecated upstream in favor of `DebugUtils`.
#![allow(deprecated)]
use ash::extensions::ext::DebugReport;
use ash::prelude::VkResult;
use ash::{vk, Device, Entry, Instance, LoadingError};
use std::ffi::CStr;

/// The subset of the Vulkan API used to bring up an instance and a device.
///
/// Implementations may assume the create-info structures they receive are
/// valid for the duration of the call, pointer chains included.
pub trait Driver {
    /// `vkEnumerateInstanceLayerProperties`.
    fn instance_layer_properties(&mut self) -> VkResult<Vec<vk::LayerProperties>>;

    /// `vkEnumerateInstanceExtensionProperties`, optionally for a single layer.
    fn instance_extension_properties(
        &mut self,
        layer_name: Option<&CStr>,
    ) -> VkResult<Vec<vk::ExtensionProperties>>;

    /// `vkCreateInstance`.
    fn create_instance(&mut self, create_info: &vk::InstanceCreateInfo) -> VkResult<vk::Instance>;

    /// `vkDestroyInstance`. Calling this twice for the same handle is
    /// undefined behavior on a real driver.
    fn destroy_instance(&mut self, instance: vk::Instance);

    /// `vkEnumeratePhysicalDevices`, count query and fetch.
    fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>>;

    /// `vkGetPhysicalDeviceProperties`.
    fn physical_device_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties>;

    /// `vkGetPhysicalDeviceQueueFamilyProperties`, in driver-reported order.
    fn queue_family_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;

    /// `vkCreateDevice`.
    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<vk::Device>;

    /// `vkDestroyDevice`. Same caveat as [`Driver::destroy_instance`].
    fn destroy_device(&mut self, device: vk::Device);

    /// `vkCreateDebugReportCallbackEXT`, resolved from `instance`.
    fn create_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        create_info: &vk::DebugReportCallbackCreateInfoEXT,
    ) -> VkResult<vk::DebugReportCallbackEXT>;

    /// `vkDestroyDebugReportCallbackEXT`, resolved from `instance`.
    fn destroy_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        callback: vk::DebugReportCallbackEXT,
    );
}

/// [`Driver`] backed by the system Vulkan loader through [`ash`].
///
/// Holds at most one instance and one device, matching the single
/// instance the engine ever creates.
pub struct AshDriver {
    entry: Entry,
    instance: Option<Instance>,
    device: Option<Device>,
    debug_report: Option<DebugReport>,
}

impl AshDriver {
    /// Load the Vulkan loader library at runtime.
    pub fn load() -> Result<AshDriver, LoadingError> {
        let entry = unsafe { Entry::load() }?;
        Ok(AshDriver::with_entry(entry))
    }

    /// Use an already loaded entry.
    pub fn with_entry(entry: Entry) -> AshDriver {
        AshDriver {
            entry,
            instance: None,
            device: None,
            debug_report: None,
        }
    }

    /// The loader entry points.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The loaded instance function table, if an instance is alive.
    #[inline]
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    fn loaded_instance(&self, handle: vk::Instance) -> VkResult<&Instance> {
        match &self.instance {
            Some(instance) if instance.handle() == handle => Ok(instance),
            _ => Err(vk::Result::ERROR_INITIALIZATION_FAILED),
        }
    }

    fn any_instance(&self) -> VkResult<&Instance> {
        self.instance
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

impl Driver for AshDriver {
    #[allow(unused_unsafe)]
    fn instance_layer_properties(&mut self) -> VkResult<Vec<vk::LayerProperties>> {
        unsafe { self.entry.enumerate_instance_layer_properties() }
    }

    #[allow(unused_unsafe)]
    fn instance_extension_properties(
        &mut self,
        layer_name: Option<&CStr>,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.entry.enumerate_instance_extension_properties(layer_name) }
    }

    fn create_instance(&mut self, create_info: &vk::InstanceCreateInfo) -> VkResult<vk::Instance> {
        if self.instance.is_some() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        let instance = unsafe { self.entry.create_instance(create_info, None) }?;
        let handle = instance.handle();
        self.instance = Some(instance);
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        match self.instance.take() {
            Some(loaded) if loaded.handle() == instance => {
                self.debug_report = None;
                unsafe { loaded.destroy_instance(None) };
            }
            other => {
                log::error!("destroy_instance called for an instance that is not alive");
                self.instance = other;
            }
        }
    }

    fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        let instance = self.loaded_instance(instance)?;
        unsafe { instance.enumerate_physical_devices() }
    }

    fn physical_device_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        let instance = self.any_instance()?;
        Ok(unsafe { instance.get_physical_device_properties(physical_device) })
    }

    fn queue_family_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let instance = self.any_instance()?;
        Ok(unsafe { instance.get_physical_device_queue_family_properties(physical_device) })
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<vk::Device> {
        if self.device.is_some() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        let instance = self.any_instance()?;
        let device = unsafe { instance.create_device(physical_device, create_info, None) }?;
        let handle = device.handle();
        self.device = Some(device);
        Ok(handle)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        match self.device.take() {
            Some(loaded) if loaded.handle() == device => unsafe { loaded.destroy_device(None) },
            other => {
                log::error!("destroy_device called for a device that is not alive");
                self.device = other;
            }
        }
    }

    fn create_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        create_info: &vk::DebugReportCallbackCreateInfoEXT,
    ) -> VkResult<vk::DebugReportCallbackEXT> {
        let loaded = self.loaded_instance(instance)?;
        let debug_report = DebugReport::new(&self.entry, loaded);
        let callback = unsafe { debug_report.create_debug_report_callback(create_info, None) }?;
        self.debug_report = Some(debug_report);
        Ok(callback)
    }

    fn destroy_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        callback: vk::DebugReportCallbackEXT,
    ) {
        if self.loaded_instance(instance).is_err() {
            log::error!("destroy_debug_report_callback called after its instance was destroyed");
            return;
        }

        match &self.debug_report {
            Some(debug_report) => unsafe {
                debug_report.destroy_debug_report_callback(callback, None)
            },
            None => log::error!("destroy_debug_report_callback called without a loaded extension"),
        }
    }
}
