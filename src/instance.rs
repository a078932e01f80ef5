//! Instance creation utils.
use crate::debug::DebugReportDescriptor;
use crate::driver::Driver;
use crate::BootstrapSmallVec;
use ash::vk;
use cstr::cstr;
use std::{
    ffi::{CStr, CString, NulError},
    fmt,
};
use thiserror::Error;

/// API version the engine targets unless told otherwise.
pub const DEFAULT_API_VERSION: u32 = vk::make_api_version(0, 1, 0, 3);

/// Engine name advertised in the application info.
#[inline]
pub fn engine_name() -> &'static CStr {
    cstr!("MarsEngine")
}

/// Name of the Khronos validation layer.
#[inline]
pub fn validation_layer_name() -> &'static CStr {
    cstr!("VK_LAYER_KHRONOS_validation")
}

/// Require, request or disable validation layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationLayers {
    /// Instance creation will fail if there are no validation layers installed.
    Require,
    /// If there are validation layers installed, enable them.
    Request,
    /// Don't enable validation layers.
    Disable,
}

/// Metadata for after instance creation.
#[derive(Clone)]
pub struct InstanceMetadata {
    instance_handle: vk::Instance,
    api_version: u32,
    enabled_layers: BootstrapSmallVec<CString>,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl InstanceMetadata {
    /// The instance this metadata belongs to.
    #[inline]
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_handle
    }

    /// Retrieve the used instance API version.
    #[inline]
    pub fn api_version_raw(&self) -> u32 {
        self.api_version
    }

    /// Retrieve the used instance API major version.
    #[inline]
    pub fn api_version_major(&self) -> u32 {
        vk::api_version_major(self.api_version)
    }

    /// Retrieve the used instance API minor version.
    #[inline]
    pub fn api_version_minor(&self) -> u32 {
        vk::api_version_minor(self.api_version)
    }

    /// List of all enabled layers in the instance.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Returns true if `layer` is enabled.
    #[inline]
    pub fn is_layer_enabled(&self, layer: &CStr) -> bool {
        self.enabled_layers.iter().any(|e| e.as_c_str() == layer)
    }

    /// List of all enabled extensions in the instance.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Returns true if `extension` is enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.enabled_extensions
            .iter()
            .any(|e| e.as_c_str() == extension)
    }

    /// Whether the instance was created with the debug report extension.
    #[inline]
    pub fn debug_report_enabled(&self) -> bool {
        self.is_extension_enabled(debug_report_extension_name())
    }
}

impl fmt::Debug for InstanceMetadata {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstanceMetadata")
            .field(
                "api_version",
                &format_args!("{}.{}", self.api_version_major(), self.api_version_minor()),
            )
            .field("enabled_layers", &self.enabled_layers)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish()
    }
}

/// Errors that can occur during instance creation.
#[derive(Debug, Error)]
pub enum InstanceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// One or more layers are not present.
    #[error("layers ({0:?}) not present")]
    LayersNotPresent(BootstrapSmallVec<CString>),
    /// One or more extensions are not present.
    #[error("extensions ({0:?}) not present")]
    ExtensionsNotPresent(BootstrapSmallVec<CString>),
    /// A name passed to the builder contained an interior nul byte.
    #[error("invalid name")]
    InvalidName(#[from] NulError),
}

/// Configures and creates a [`vk::Instance`] through a [`Driver`].
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    app_name: Option<CString>,
    app_version: u32,
    engine_name: CString,
    engine_version: u32,
    api_version: u32,
    layers: BootstrapSmallVec<(CString, bool)>,
    extensions: BootstrapSmallVec<(CString, bool)>,
    debug_report: Option<DebugReportDescriptor>,
}

impl InstanceBuilder {
    /// Create a new instance builder targeting [`DEFAULT_API_VERSION`].
    #[inline]
    pub fn new() -> Self {
        InstanceBuilder {
            app_name: None,
            app_version: 0,
            engine_name: engine_name().to_owned(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: DEFAULT_API_VERSION,
            layers: BootstrapSmallVec::new(),
            extensions: BootstrapSmallVec::new(),
            debug_report: None,
        }
    }

    /// Application name to advertise.
    #[inline]
    pub fn app_name(mut self, app_name: &str) -> Result<Self, NulError> {
        self.app_name = Some(CString::new(app_name)?);
        Ok(self)
    }

    /// Application version to advertise.
    #[inline]
    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    /// Application version to advertise, already packed.
    #[inline]
    pub fn app_version_raw(mut self, app_version: u32) -> Self {
        self.app_version = app_version;
        self
    }

    /// Engine name to advertise. Defaults to [`engine_name()`].
    #[inline]
    pub fn engine_name(mut self, engine_name: &str) -> Result<Self, NulError> {
        self.engine_name = CString::new(engine_name)?;
        Ok(self)
    }

    /// Engine version to advertise, already packed.
    #[inline]
    pub fn engine_version_raw(mut self, engine_version: u32) -> Self {
        self.engine_version = engine_version;
        self
    }

    /// Instance API version to request.
    #[inline]
    pub fn api_version_raw(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Try to enable this layer, ignore if it's not supported.
    #[inline]
    pub fn request_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), false));
        self
    }

    /// Enable this layer, fail if it's not supported.
    #[inline]
    pub fn require_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), true));
        self
    }

    /// Try to enable this extension, ignore if it is not supported.
    #[inline]
    pub fn request_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), false));
        self
    }

    /// Enable this extension, fail if it's not supported.
    #[inline]
    pub fn require_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), true));
        self
    }

    /// Add Khronos validation layers.
    #[inline]
    pub fn validation_layers(mut self, validation_layers: ValidationLayers) -> Self {
        match validation_layers {
            ValidationLayers::Require | ValidationLayers::Request => {
                self.layers.push((
                    validation_layer_name().to_owned(),
                    validation_layers == ValidationLayers::Require,
                ));
            }
            ValidationLayers::Disable => (),
        }

        self
    }

    /// Request the debug report extension and chain `descriptor` into
    /// instance creation, so messages emitted while the instance is being
    /// created are reported as well.
    #[inline]
    pub fn debug_report(mut self, descriptor: DebugReportDescriptor) -> Self {
        self.extensions.push((debug_report_extension_name().to_owned(), false));
        self.debug_report = Some(descriptor);
        self
    }

    /// Creates the instance. Returns its handle and [`InstanceMetadata`]
    /// about what is actually enabled in it.
    pub fn build(
        self,
        driver: &mut impl Driver,
    ) -> Result<(vk::Instance, InstanceMetadata), InstanceCreationError> {
        let layer_properties = driver.instance_layer_properties()?;
        let mut enabled_layers = BootstrapSmallVec::new();
        let mut layers_not_present = BootstrapSmallVec::new();
        for (layer_name, required) in self.layers {
            let present = layer_properties
                .iter()
                .any(|supported| fixed_str(&supported.layer_name) == Some(layer_name.as_c_str()));

            match (required, present) {
                (_, true) => enabled_layers.push(layer_name),
                (true, false) => layers_not_present.push(layer_name),
                (false, false) => log::warn!("Layer {:?} is not available, skipping.", layer_name),
            }
        }

        if !layers_not_present.is_empty() {
            return Err(InstanceCreationError::LayersNotPresent(layers_not_present));
        }

        let mut extension_properties = driver.instance_extension_properties(None)?;
        for layer_name in &enabled_layers {
            extension_properties
                .extend(driver.instance_extension_properties(Some(layer_name.as_c_str()))?);
        }

        let mut enabled_extensions = BootstrapSmallVec::new();
        let mut extensions_not_present = BootstrapSmallVec::new();
        for (extension_name, required) in self.extensions {
            if enabled_extensions.contains(&extension_name) {
                continue;
            }

            let present = extension_properties.iter().any(|supported| {
                fixed_str(&supported.extension_name) == Some(extension_name.as_c_str())
            });

            match (required, present) {
                (_, true) => enabled_extensions.push(extension_name),
                (true, false) => extensions_not_present.push(extension_name),
                (false, false) => {
                    log::warn!("Extension {:?} is not available, skipping.", extension_name)
                }
            }
        }

        if !extensions_not_present.is_empty() {
            return Err(InstanceCreationError::ExtensionsNotPresent(
                extensions_not_present,
            ));
        }

        let mut app_info = vk::ApplicationInfo::builder()
            .application_version(self.app_version)
            .engine_name(&self.engine_name)
            .engine_version(self.engine_version)
            .api_version(self.api_version);
        if let Some(app_name) = &self.app_name {
            app_info = app_info.application_name(app_name);
        }

        let layer_ptrs: BootstrapSmallVec<_> = enabled_layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: BootstrapSmallVec<_> =
            enabled_extensions.iter().map(|e| e.as_ptr()).collect();

        let mut debug_info;
        let mut instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let debug_report_enabled = enabled_extensions
            .iter()
            .any(|e| e.as_c_str() == debug_report_extension_name());
        if let (Some(descriptor), true) = (&self.debug_report, debug_report_enabled) {
            debug_info = descriptor.create_info();
            instance_info = instance_info.push_next(&mut debug_info);
        }

        let instance_handle = driver.create_instance(&instance_info)?;
        let instance_metadata = InstanceMetadata {
            instance_handle,
            api_version: self.api_version,
            enabled_layers,
            enabled_extensions,
        };

        Ok((instance_handle, instance_metadata))
    }
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases `instance`. Must be called exactly once per created instance,
/// after every device and debug callback created from it is gone.
pub fn destroy_instance(driver: &mut impl Driver, instance: vk::Instance) {
    driver.destroy_instance(instance);
}

#[allow(deprecated)]
#[inline]
fn debug_report_extension_name() -> &'static CStr {
    ash::extensions::ext::DebugReport::name()
}

/// Reads a nul-terminated name out of a fixed-size Vulkan array.
fn fixed_str(raw: &[std::os::raw::c_char]) -> Option<&CStr> {
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr() as *const u8, raw.len()) };
    CStr::from_bytes_until_nul(bytes).ok()
}
