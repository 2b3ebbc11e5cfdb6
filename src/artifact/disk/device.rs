//! Partition device naming.

/// Device node for partition `number` on `device`.
///
/// Devices whose name already ends in a digit (`/dev/nvme0n1`, `/dev/loop0`)
/// take a `p` before the partition number; others (`/dev/vda`) do not.
pub fn partition_device(device: &str, number: u32) -> String {
    if device.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", device, number)
    } else {
        format!("{}{}", device, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_disk() {
        assert_eq!(partition_device("/dev/vda", 2), "/dev/vda2");
        assert_eq!(partition_device("/dev/sdb", 1), "/dev/sdb1");
    }

    #[test]
    fn test_digit_suffixed_disk() {
        assert_eq!(partition_device("/dev/nvme0n1", 1), "/dev/nvme0n1p1");
        assert_eq!(partition_device("/dev/loop12", 3), "/dev/loop12p3");
    }
}
