#![allow(dead_code)]

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use mars_bootstrap::Driver;
use std::{cell::RefCell, ffi::CStr, os::raw::c_char, rc::Rc};

/// A physical device as the scripted driver reports it.
#[derive(Debug, Clone)]
pub struct FakePhysicalDevice {
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<vk::QueueFlags>,
}

impl FakePhysicalDevice {
    pub fn new(device_type: vk::PhysicalDeviceType, queue_families: &[vk::QueueFlags]) -> Self {
        FakePhysicalDevice {
            device_type,
            queue_families: queue_families.to_vec(),
        }
    }

    pub fn graphics() -> Self {
        Self::new(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            &[vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE],
        )
    }
}

/// What a device-create call asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub physical_device: vk::PhysicalDevice,
    pub queues: Vec<(u32, Vec<f32>)>,
    pub enabled_extension_count: u32,
}

/// What an instance-create call asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRequest {
    pub app_name: Option<String>,
    pub engine_name: Option<String>,
    pub app_version: u32,
    pub engine_version: u32,
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    pub chained_debug_report: bool,
}

#[derive(Debug, Default)]
pub struct State {
    pub layers: Vec<&'static str>,
    pub extensions: Vec<&'static str>,
    pub physical_devices: Vec<FakePhysicalDevice>,

    pub instance_result: Option<vk::Result>,
    pub device_result: Option<vk::Result>,
    pub debug_result: Option<vk::Result>,

    pub live_instances: Vec<vk::Instance>,
    pub live_devices: Vec<vk::Device>,
    pub live_callbacks: Vec<vk::DebugReportCallbackEXT>,

    pub instance_requests: Vec<InstanceRequest>,
    pub device_requests: Vec<DeviceRequest>,
    pub enumerate_calls: usize,
    /// Names of destroy calls, in order.
    pub destroyed: Vec<&'static str>,

    next_handle: u64,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn nothing_alive(&self) -> bool {
        self.live_instances.is_empty()
            && self.live_devices.is_empty()
            && self.live_callbacks.is_empty()
    }
}

/// Scripted [`Driver`]. Clones share state, so a test can keep one clone to
/// inspect what the engine did with the other.
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    pub state: Rc<RefCell<State>>,
}

impl FakeDriver {
    /// A driver with the validation layer, the debug report extension and
    /// the given physical devices.
    pub fn with_devices(physical_devices: Vec<FakePhysicalDevice>) -> Self {
        let driver = FakeDriver::default();
        {
            let mut state = driver.state.borrow_mut();
            state.layers = vec!["VK_LAYER_KHRONOS_validation"];
            state.extensions = vec!["VK_EXT_debug_report"];
            state.physical_devices = physical_devices;
        }
        driver
    }

    pub fn state(&self) -> std::cell::Ref<'_, State> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, State> {
        self.state.borrow_mut()
    }

    fn device_index(&self, physical_device: vk::PhysicalDevice) -> VkResult<usize> {
        let index = physical_device.as_raw() as usize;
        if index == 0 || index > self.state().physical_devices.len() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(index - 1)
    }
}

fn fixed<const N: usize>(name: &str) -> [c_char; N] {
    let mut out = [0 as c_char; N];
    for (o, b) in out.iter_mut().zip(name.bytes()) {
        *o = b as c_char;
    }
    out
}

unsafe fn names(ptrs: *const *const c_char, count: u32) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptrs, count as usize)
        .iter()
        .map(|&p| CStr::from_ptr(p).to_string_lossy().into_owned())
        .collect()
}

unsafe fn opt_name(ptr: *const c_char) -> Option<String> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

impl Driver for FakeDriver {
    fn instance_layer_properties(&mut self) -> VkResult<Vec<vk::LayerProperties>> {
        Ok(self
            .state()
            .layers
            .iter()
            .map(|name| vk::LayerProperties {
                layer_name: fixed(name),
                ..Default::default()
            })
            .collect())
    }

    fn instance_extension_properties(
        &mut self,
        layer_name: Option<&CStr>,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        if layer_name.is_some() {
            return Ok(Vec::new());
        }

        Ok(self
            .state()
            .extensions
            .iter()
            .map(|name| vk::ExtensionProperties {
                extension_name: fixed(name),
                ..Default::default()
            })
            .collect())
    }

    fn create_instance(&mut self, create_info: &vk::InstanceCreateInfo) -> VkResult<vk::Instance> {
        let request = unsafe {
            let app_info = &*create_info.p_application_info;
            let chained_debug_report = !create_info.p_next.is_null()
                && (*(create_info.p_next as *const vk::BaseInStructure)).s_type
                    == vk::StructureType::DEBUG_REPORT_CALLBACK_CREATE_INFO_EXT;
            InstanceRequest {
                app_name: opt_name(app_info.p_application_name),
                engine_name: opt_name(app_info.p_engine_name),
                app_version: app_info.application_version,
                engine_version: app_info.engine_version,
                api_version: app_info.api_version,
                layers: names(
                    create_info.pp_enabled_layer_names,
                    create_info.enabled_layer_count,
                ),
                extensions: names(
                    create_info.pp_enabled_extension_names,
                    create_info.enabled_extension_count,
                ),
                chained_debug_report,
            }
        };

        let mut state = self.state_mut();
        state.instance_requests.push(request);
        if let Some(err) = state.instance_result {
            return Err(err);
        }

        let instance = vk::Instance::from_raw(state.handle());
        state.live_instances.push(instance);
        Ok(instance)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        let mut state = self.state_mut();
        state.destroyed.push("instance");
        assert!(
            state.live_devices.is_empty(),
            "instance destroyed with a live device"
        );
        assert!(
            state.live_callbacks.is_empty(),
            "instance destroyed with a live debug callback"
        );
        let before = state.live_instances.len();
        state.live_instances.retain(|&i| i != instance);
        assert_eq!(before - 1, state.live_instances.len(), "instance destroyed twice");
    }

    fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        let mut state = self.state_mut();
        state.enumerate_calls += 1;
        if !state.live_instances.contains(&instance) {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        Ok((1..=state.physical_devices.len() as u64)
            .map(vk::PhysicalDevice::from_raw)
            .collect())
    }

    fn physical_device_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        let index = self.device_index(physical_device)?;
        Ok(vk::PhysicalDeviceProperties {
            device_type: self.state().physical_devices[index].device_type,
            device_name: fixed(&format!("Fake GPU {}", index)),
            ..Default::default()
        })
    }

    fn queue_family_properties(
        &mut self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let index = self.device_index(physical_device)?;
        Ok(self.state().physical_devices[index]
            .queue_families
            .iter()
            .map(|&queue_flags| vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 4,
                ..Default::default()
            })
            .collect())
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<vk::Device> {
        let queues = unsafe {
            std::slice::from_raw_parts(
                create_info.p_queue_create_infos,
                create_info.queue_create_info_count as usize,
            )
            .iter()
            .map(|info| {
                let priorities =
                    std::slice::from_raw_parts(info.p_queue_priorities, info.queue_count as usize);
                (info.queue_family_index, priorities.to_vec())
            })
            .collect()
        };

        let mut state = self.state_mut();
        state.device_requests.push(DeviceRequest {
            physical_device,
            queues,
            enabled_extension_count: create_info.enabled_extension_count,
        });
        if let Some(err) = state.device_result {
            return Err(err);
        }
        assert!(!state.live_instances.is_empty(), "device without instance");

        let device = vk::Device::from_raw(state.handle());
        state.live_devices.push(device);
        Ok(device)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        let mut state = self.state_mut();
        state.destroyed.push("device");
        let before = state.live_devices.len();
        state.live_devices.retain(|&d| d != device);
        assert_eq!(before - 1, state.live_devices.len(), "device destroyed twice");
    }

    fn create_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        create_info: &vk::DebugReportCallbackCreateInfoEXT,
    ) -> VkResult<vk::DebugReportCallbackEXT> {
        let mut state = self.state_mut();
        if let Some(err) = state.debug_result {
            return Err(err);
        }
        assert!(state.live_instances.contains(&instance));
        assert!(create_info.pfn_callback.is_some());

        let callback = vk::DebugReportCallbackEXT::from_raw(state.handle());
        state.live_callbacks.push(callback);
        Ok(callback)
    }

    fn destroy_debug_report_callback(
        &mut self,
        instance: vk::Instance,
        callback: vk::DebugReportCallbackEXT,
    ) {
        let mut state = self.state_mut();
        state.destroyed.push("debug_report_callback");
        assert!(state.live_instances.contains(&instance));
        state.live_callbacks.retain(|&c| c != callback);
    }
}
