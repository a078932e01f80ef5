//! Engine lifecycle: bring up an instance and a device, tear them down in
//! reverse order.
use crate::debug::{DebugReportDescriptor, DebugReporter};
use crate::device::{
    self, create_device_single, first_matching_queue_family, physical_devices, DeviceCreationError,
    DeviceMetadata, DeviceSelection, QueueSetup,
};
use crate::driver::Driver;
use crate::instance::{
    self, InstanceBuilder, InstanceCreationError, InstanceMetadata, ValidationLayers,
};
use crate::BootstrapSmallVec;
use ash::vk;
use std::fmt;
use thiserror::Error;

/// Whether validation layers and the debug report bridge are installed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Diagnostics {
    /// Plain instance, no layers, no extensions, no callback.
    Disabled,
    /// Validation layer, debug report extension and callback.
    Enabled {
        /// Raise an OS alert for error reports.
        alert_on_error: bool,
    },
}

impl Diagnostics {
    /// Enabled in debug builds, disabled in release builds.
    #[inline]
    pub fn from_build() -> Diagnostics {
        if cfg!(debug_assertions) {
            Diagnostics::Enabled {
                alert_on_error: true,
            }
        } else {
            Diagnostics::Disabled
        }
    }

    /// The callback descriptor to install, if any.
    pub fn descriptor(self) -> Option<DebugReportDescriptor> {
        match self {
            Diagnostics::Disabled => None,
            Diagnostics::Enabled { alert_on_error } => {
                Some(DebugReportDescriptor::all().alert_on_error(alert_on_error))
            }
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::from_build()
    }
}

/// Parameters of [`Engine::start`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application name advertised to the driver.
    pub app_name: String,
    /// Packed application version.
    pub app_version: u32,
    /// Validation and debug reporting.
    pub diagnostics: Diagnostics,
    /// Capabilities the selected queue family must have.
    pub queue_flags: vk::QueueFlags,
    /// Priority of the single created queue.
    pub queue_priority: f32,
    /// Physical device selection policy.
    pub selection: DeviceSelection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            app_name: "Hello Vulkan".to_owned(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            diagnostics: Diagnostics::default(),
            queue_flags: vk::QueueFlags::GRAPHICS,
            queue_priority: 1.0,
            selection: DeviceSelection::First,
        }
    }
}

/// Fatal startup failures. Each aborts [`Engine::start`] after whatever
/// was already created has been released.
#[derive(Debug, Error)]
pub enum StartError {
    /// The instance could not be created.
    #[error("Could not create Vulkan Instance")]
    InstanceCreation(#[source] InstanceCreationError),
    /// Physical devices or their properties could not be queried.
    #[error("Could not query physical devices")]
    Enumeration(#[source] vk::Result),
    /// The instance reports no physical devices.
    #[error("NoDeviceFound: no physical device available")]
    NoDeviceFound,
    /// The selected physical device has no queue family with the requested
    /// capabilities.
    #[error("NoSuitableQueueFamily: no queue family supports {0:?}")]
    NoSuitableQueueFamily(vk::QueueFlags),
    /// The logical device could not be created.
    #[error("Could not create Vulkan Device")]
    DeviceCreation(#[source] DeviceCreationError),
}

/// Teardown precondition violations. The offending driver call is not made.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum TeardownError {
    /// There is no live device to destroy.
    #[error("device is not alive")]
    DeviceNotAlive,
    /// There is no live instance to destroy.
    #[error("instance is not alive")]
    InstanceNotAlive,
    /// The instance still has a live device.
    #[error("device must be destroyed before the instance")]
    DeviceStillAlive,
    /// The instance still has a registered debug callback.
    #[error("debug callback must be unregistered before the instance is destroyed")]
    DebugCallbackStillRegistered,
}

/// Handles created during startup. `None` means not alive.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    instance: Option<vk::Instance>,
    physical_device: Option<vk::PhysicalDevice>,
    queue_family_index: Option<u32>,
    device: Option<vk::Device>,
    debug_reporter: DebugReporter,
}

impl HandleRegistry {
    /// An empty registry.
    #[inline]
    pub fn new() -> HandleRegistry {
        HandleRegistry::default()
    }

    /// The instance, while alive.
    #[inline]
    pub fn instance(&self) -> Option<vk::Instance> {
        self.instance
    }

    /// The selected physical device.
    #[inline]
    pub fn physical_device(&self) -> Option<vk::PhysicalDevice> {
        self.physical_device
    }

    /// The queue family the device queue was created on.
    #[inline]
    pub fn queue_family_index(&self) -> Option<u32> {
        self.queue_family_index
    }

    /// The logical device, while alive.
    #[inline]
    pub fn device(&self) -> Option<vk::Device> {
        self.device
    }

    /// Debug callback registration state.
    #[inline]
    pub fn debug_reporter(&self) -> &DebugReporter {
        &self.debug_reporter
    }

    /// True when nothing is alive.
    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
            && self.physical_device.is_none()
            && self.queue_family_index.is_none()
            && self.device.is_none()
            && !self.debug_reporter.is_registered()
    }

    /// Destroys the device.
    pub fn destroy_device(&mut self, driver: &mut impl Driver) -> Result<(), TeardownError> {
        let device = self.device.take().ok_or_else(|| {
            log::error!("Refusing to destroy a device that is not alive.");
            TeardownError::DeviceNotAlive
        })?;

        device::destroy_device(driver, device);
        self.queue_family_index = None;
        log::info!("Device destroyed.");
        Ok(())
    }

    /// Unregisters the debug callback, if one is registered.
    pub fn unregister_debug(&mut self, driver: &mut impl Driver) -> Result<(), TeardownError> {
        if !self.debug_reporter.is_registered() {
            return Ok(());
        }

        if self.instance.is_none() {
            log::error!("Debug callback outlived its instance.");
            return Err(TeardownError::InstanceNotAlive);
        }

        self.debug_reporter.unregister(driver);
        log::info!("Debug report callback unregistered.");
        Ok(())
    }

    /// Destroys the instance. The device must be destroyed and the debug
    /// callback unregistered first.
    pub fn destroy_instance(&mut self, driver: &mut impl Driver) -> Result<(), TeardownError> {
        let instance = self.instance.ok_or_else(|| {
            log::error!("Refusing to destroy an instance that is not alive.");
            TeardownError::InstanceNotAlive
        })?;

        if self.device.is_some() {
            log::error!("Refusing to destroy the instance while its device is alive.");
            return Err(TeardownError::DeviceStillAlive);
        }

        if self.debug_reporter.is_registered() {
            log::error!("Refusing to destroy the instance while its debug callback is registered.");
            return Err(TeardownError::DebugCallbackStillRegistered);
        }

        instance::destroy_instance(driver, instance);
        self.instance = None;
        self.physical_device = None;
        log::info!("Instance destroyed.");
        Ok(())
    }

    /// Releases everything alive, device first, instance last.
    pub fn teardown(&mut self, driver: &mut impl Driver) -> Result<(), TeardownError> {
        if self.device.is_some() {
            self.destroy_device(driver)?;
        }

        self.unregister_debug(driver)?;

        if self.instance.is_some() {
            self.destroy_instance(driver)?;
        }

        self.physical_device = None;
        self.queue_family_index = None;
        Ok(())
    }
}

/// A running engine: one instance, one device, one queue family.
///
/// Dropping an engine that was not [stopped](Engine::stop) tears it down
/// as well.
pub struct Engine<D: Driver> {
    driver: D,
    registry: HandleRegistry,
    instance_metadata: Option<InstanceMetadata>,
    device_metadata: Option<DeviceMetadata>,
}

impl<D: Driver> Engine<D> {
    /// Creates the instance, picks a physical device and queue family and
    /// creates the device, in that order. Stops at the first failure and
    /// releases whatever was created before returning it.
    pub fn start(driver: D, config: &EngineConfig) -> Result<Engine<D>, StartError> {
        let mut engine = Engine {
            driver,
            registry: HandleRegistry::new(),
            instance_metadata: None,
            device_metadata: None,
        };

        match engine.bring_up(config) {
            Ok(()) => Ok(engine),
            Err(err) => {
                log::error!("Engine startup failed: {}", err);
                if let Err(teardown) = engine.teardown() {
                    log::error!("Cleanup after failed startup failed: {}", teardown);
                }
                Err(err)
            }
        }
    }

    fn bring_up(&mut self, config: &EngineConfig) -> Result<(), StartError> {
        let descriptor = config.diagnostics.descriptor();

        let mut instance_builder = InstanceBuilder::new()
            .app_name(&config.app_name)
            .map_err(|err| StartError::InstanceCreation(err.into()))?
            .app_version_raw(config.app_version);
        if let Some(descriptor) = descriptor {
            instance_builder = instance_builder
                .validation_layers(ValidationLayers::Request)
                .debug_report(descriptor);
        }

        let (instance, instance_metadata) = instance_builder
            .build(&mut self.driver)
            .map_err(StartError::InstanceCreation)?;
        self.registry.instance = Some(instance);
        log::info!("Instance created.");

        if let Some(descriptor) = descriptor {
            if instance_metadata.debug_report_enabled() {
                match self
                    .registry
                    .debug_reporter
                    .register(&mut self.driver, instance, &descriptor)
                {
                    Ok(()) => log::info!("Debug report callback registered."),
                    Err(err) => log::warn!(
                        "Could not register debug report callback ({}), diagnostics unavailable.",
                        err
                    ),
                }
            } else {
                log::warn!("Debug report extension not available, diagnostics unavailable.");
            }
        }
        self.instance_metadata = Some(instance_metadata);

        let devices =
            physical_devices(&mut self.driver, instance).map_err(StartError::Enumeration)?;
        log::info!("Found {} physical devices.", devices.len());

        let physical_device = config
            .selection
            .select(&mut self.driver, &devices)
            .map_err(StartError::Enumeration)?
            .ok_or(StartError::NoDeviceFound)?;
        if config.selection == DeviceSelection::First {
            log::info!("Assuming physical device at index 0 to be correct.");
        }
        self.registry.physical_device = Some(physical_device);

        let properties = self
            .driver
            .physical_device_properties(physical_device)
            .map_err(StartError::Enumeration)?;
        log::debug!("Using physical device {}.", device::device_name(&properties));

        let queue_family_properties = self
            .driver
            .queue_family_properties(physical_device)
            .map_err(StartError::Enumeration)?;
        let queue_family_index =
            first_matching_queue_family(&queue_family_properties, config.queue_flags)
                .ok_or(StartError::NoSuitableQueueFamily(config.queue_flags))?;
        self.registry.queue_family_index = Some(queue_family_index);

        let queue_setup = QueueSetup::new(1, queue_family_index, &[config.queue_priority])
            .map_err(StartError::DeviceCreation)?;
        let device = create_device_single(&mut self.driver, physical_device, &queue_setup)
            .map_err(StartError::DeviceCreation)?;
        self.registry.device = Some(device);
        log::info!("Device created.");

        let mut queue_setups = BootstrapSmallVec::new();
        queue_setups.push(queue_setup);
        self.device_metadata = Some(DeviceMetadata::new(
            device,
            physical_device,
            properties,
            queue_setups,
            queue_family_properties,
        ));

        Ok(())
    }

    /// Destroys the device, unregisters the debug callback and destroys the
    /// instance.
    pub fn stop(mut self) -> Result<(), TeardownError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), TeardownError> {
        self.device_metadata = None;
        self.instance_metadata = None;
        self.registry.teardown(&mut self.driver)
    }

    /// Destroys the device only. A second call is rejected.
    pub fn destroy_device(&mut self) -> Result<(), TeardownError> {
        self.device_metadata = None;
        self.registry.destroy_device(&mut self.driver)
    }

    /// Unregisters the debug callback only.
    pub fn unregister_debug(&mut self) -> Result<(), TeardownError> {
        self.registry.unregister_debug(&mut self.driver)
    }

    /// Destroys the instance only. Rejected while the device or the debug
    /// callback is alive, and on a second call.
    pub fn destroy_instance(&mut self) -> Result<(), TeardownError> {
        self.registry.destroy_instance(&mut self.driver)?;
        self.instance_metadata = None;
        Ok(())
    }

    /// The instance, while alive.
    #[inline]
    pub fn instance(&self) -> Option<vk::Instance> {
        self.registry.instance()
    }

    /// The selected physical device.
    #[inline]
    pub fn physical_device(&self) -> Option<vk::PhysicalDevice> {
        self.registry.physical_device()
    }

    /// The queue family the device queue was created on.
    #[inline]
    pub fn queue_family_index(&self) -> Option<u32> {
        self.registry.queue_family_index()
    }

    /// The logical device, while alive.
    #[inline]
    pub fn device(&self) -> Option<vk::Device> {
        self.registry.device()
    }

    /// The live handles.
    #[inline]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Whether the debug callback is registered.
    #[inline]
    pub fn debug_reporter(&self) -> &DebugReporter {
        self.registry.debug_reporter()
    }

    /// What the instance was created with.
    #[inline]
    pub fn instance_metadata(&self) -> Option<&InstanceMetadata> {
        self.instance_metadata.as_ref()
    }

    /// What the device was created with.
    #[inline]
    pub fn device_metadata(&self) -> Option<&DeviceMetadata> {
        self.device_metadata.as_ref()
    }

    /// The driver everything was created through.
    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: Driver> fmt::Debug for Engine<D> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("instance_metadata", &self.instance_metadata)
            .field("device_metadata", &self.device_metadata)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Drop for Engine<D> {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }

        log::warn!("Engine dropped without being stopped, tearing down.");
        if let Err(err) = self.teardown() {
            log::error!("Teardown on drop failed: {}", err);
        }
    }
}
