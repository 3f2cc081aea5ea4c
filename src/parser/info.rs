use crate::model::DeviceInfo;

#[derive(Clone, Copy)]
enum InfoField {
    Manufacturer,
    Model,
    Firmware,
    Barcode,
    Spec,
    CellCount,
}

// Lower-case key fragments; a key may match more than one entry
const KEY_TABLE: &[(&str, InfoField)] = &[
    ("manufacturer", InfoField::Manufacturer),
    ("device name", InfoField::Model),
    ("model", InfoField::Model),
    ("main soft", InfoField::Firmware),
    ("sw_version", InfoField::Firmware),
    ("barcode", InfoField::Barcode),
    ("specification", InfoField::Spec),
    ("cell number", InfoField::CellCount),
];

/// Parse the `info` dump into device identity fields.
///
/// Lines without a colon and unknown keys are ignored. A non-numeric cell
/// count leaves the field unset.
pub fn parse_info(text: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let mut applied_model = false;
        let mut applied_fw = false;
        for (fragment, target) in KEY_TABLE {
            if !key.contains(fragment) {
                continue;
            }
            match target {
                InfoField::Manufacturer => info.manufacturer = Some(value.to_string()),
                InfoField::Model if !applied_model => {
                    info.model = Some(value.to_string());
                    applied_model = true;
                }
                InfoField::Firmware if !applied_fw => {
                    info.firmware_version = Some(value.to_string());
                    applied_fw = true;
                }
                InfoField::Barcode => info.barcode = Some(value.to_string()),
                InfoField::Spec => info.spec = Some(value.to_string()),
                InfoField::CellCount => {
                    if let Ok(n) = value.parse::<u32>() {
                        info.cell_count = Some(n);
                    }
                }
                _ => {}
            }
        }
    }

    info
}
