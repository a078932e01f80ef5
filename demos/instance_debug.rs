#![allow(deprecated)]

use ash::extensions::ext::DebugReport;
use ash::vk;
use mars_bootstrap::{
    AshDriver, DebugReportDescriptor, DebugReporter, InstanceBuilder, ValidationLayers,
};
use std::ffi::CString;

fn main() {
    let mut driver = AshDriver::load().unwrap();
    let descriptor = DebugReportDescriptor::all().alert_on_error(false);
    let (instance, metadata) = InstanceBuilder::new()
        .app_name("instance_debug")
        .unwrap()
        .validation_layers(ValidationLayers::Request)
        .debug_report(descriptor)
        .build(&mut driver)
        .unwrap();

    let mut reporter = DebugReporter::default();
    if metadata.debug_report_enabled() {
        reporter.register(&mut driver, instance, &descriptor).unwrap();

        let loaded = driver.instance().unwrap();
        let debug_report = DebugReport::new(driver.entry(), loaded);
        let layer = CString::new("instance_debug").unwrap();
        let message = CString::new(format!("{:#?}", metadata)).unwrap();
        for flags in [
            vk::DebugReportFlagsEXT::INFORMATION,
            vk::DebugReportFlagsEXT::WARNING | vk::DebugReportFlagsEXT::ERROR,
        ] {
            unsafe {
                (debug_report.fp().debug_report_message_ext)(
                    instance,
                    flags,
                    vk::DebugReportObjectTypeEXT::INSTANCE,
                    0,
                    0,
                    0,
                    layer.as_ptr(),
                    message.as_ptr(),
                );
            }
        }
    } else {
        eprintln!("VK_EXT_debug_report is not available");
    }

    reporter.unregister(&mut driver);
    mars_bootstrap::destroy_instance(&mut driver, instance);
}
