use thiserror::Error;

/// Usable interfaces. <br>
/// Necessary: Presence of adresses.
pub fn usable_sorted() -> Result<Vec<pcap::Device>, InterfaceError> {
    let mut interfaces: Vec<pcap::Device> = pcap::Device::list()
        .map_err(InterfaceError::PcapError)?
        .into_iter()
        .filter(|device| !device.addresses.is_empty())
        .collect();

    interfaces.sort_by_key(|device| device.addresses.len());
    interfaces.reverse();

    Ok(interfaces)
}

pub fn get_network_interface_name(network_interface: &pcap::Device) -> String {
    #[cfg(target_os = "windows")]
    let name = if let Some(desc) = &network_interface.desc {
        desc.clone()
    } else {
        network_interface.name.clone()
    };

    #[cfg(not(target_os = "windows"))]
    let name = network_interface.name.clone();

    name
}

/// Get `Device` by its name or description. <br>
/// Interfaces without addresses (e.g. `dummy0` used for replay) are matched too.
pub fn get_network_interface(device_name: &str) -> Result<pcap::Device, InterfaceError> {
    let needed_interface = |device: &pcap::Device| {
        device.name == device_name || device.desc.as_deref() == Some(device_name)
    };

    pcap::Device::list()
        .map_err(InterfaceError::PcapError)?
        .into_iter()
        .find(needed_interface)
        .ok_or_else(|| InterfaceError::UnknownInterface(device_name.to_string()))
}

/// Logs interfaces an operator could put into the config instead.
pub fn log_usable_interfaces() {
    match usable_sorted() {
        Ok(interfaces) => {
            for interface in interfaces {
                log::info!("Usable interface: {}", get_network_interface_name(&interface));
            }
        },
        Err(err) => log::error!("{}", err),
    }
}

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("Pcap Library error.")]
    PcapError(pcap::Error),

    #[error("There are no interfaces with name \"{0}\".")]
    UnknownInterface(String),
}

impl InterfaceError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            InterfaceError::PcapError(err) => Some(err.to_string()),
            InterfaceError::UnknownInterface(_) => None,
        }
    }
}
