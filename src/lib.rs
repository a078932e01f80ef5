#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
Vulkan bootstrap for the Mars engine, built on [`ash`] and modeled after
[`vk-bootstrap`].

- ✅ Instance creation, with optional validation layers
- ✅ Debug report callback bridge
- ✅ Physical device and queue family selection
- ✅ Logical device creation
- ✅ Ordered teardown

All driver calls go through the [`Driver`] trait. [`AshDriver`] loads the
system Vulkan loader at runtime.

## Example

```rust,no_run
use mars_bootstrap::{AshDriver, Engine, EngineConfig};

let driver = AshDriver::load()?;
let engine = Engine::start(driver, &EngineConfig::default())?;
println!("queue family {:?}", engine.queue_family_index());
engine.stop()?;
# Ok::<(), Box<dyn std::error::Error>>(())
```

## Lower level

Each step is usable on its own:

```rust,no_run
use ash::vk;
use mars_bootstrap::{
    create_device_single, physical_devices, queue_family_index, AshDriver, InstanceBuilder,
    QueueSetup,
};

let mut driver = AshDriver::load()?;
let (instance, _metadata) = InstanceBuilder::new()
    .app_name("Hello Vulkan")?
    .app_version(0, 1, 0)
    .build(&mut driver)?;
let physical_device = physical_devices(&mut driver, instance)?[0];
let family = queue_family_index(&mut driver, physical_device, vk::QueueFlags::GRAPHICS)?
    .expect("no graphics queue");
let device = create_device_single(&mut driver, physical_device, &QueueSetup::simple(family, 1))?;

mars_bootstrap::destroy_device(&mut driver, device);
mars_bootstrap::destroy_instance(&mut driver, instance);
# Ok::<(), Box<dyn std::error::Error>>(())
```

## Licensing

This project is licensed under the [zlib License].

[zlib License]: https://opensource.org/licenses/Zlib
[`vk-bootstrap`]: https://github.com/charles-lunarg/vk-bootstrap
*/

pub mod alert;
pub mod config;
pub mod debug;
pub mod device;
pub mod driver;
pub mod engine;
pub mod instance;

pub use config::*;
pub use debug::*;
pub use device::*;
pub use driver::*;
pub use engine::*;
pub use instance::*;

type BootstrapSmallVec<T> = smallvec::SmallVec<[T; 8]>;
