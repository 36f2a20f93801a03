pub mod tests {
    use ethers::types::{Address, U256};

    use crate::{ArchiveInfo, ArtifactRecord, ArtifactStatus, DonorEntry};

    pub const TEST_ARCHIVE_NAME: &str = "Harbor Letters";
    pub const TEST_ARCHIVE_DESCRIPTION: &str = "Correspondence from the old port";

    pub fn test_admin() -> Address {
        Address::repeat_byte(0xad)
    }

    pub fn test_viewer() -> Address {
        Address::repeat_byte(0x11)
    }

    pub fn test_archive_address(index: u8) -> Address {
        let mut bytes = [0xa0; 20];
        bytes[19] = index;
        Address::from(bytes)
    }

    pub fn mock_donors(count: usize) -> Vec<DonorEntry> {
        (0..count)
            .map(|i| DonorEntry {
                donor: Address::repeat_byte(0x20 + i as u8),
                total_donated: U256::from(1_000u64 * (i as u64 + 1)),
                donation_count: U256::from(i as u64 + 1),
            })
            .collect()
    }

    pub fn mock_artifact(id: u64, status: ArtifactStatus) -> ArtifactRecord {
        ArtifactRecord {
            id: U256::from(id),
            title: format!("artifact {}", id),
            uri: format!("https://arweave.net/tx{}", id),
            mime_type: "image/png".to_string(),
            timestamp: U256::from(1_700_000_000u64 + id),
            submitter: test_viewer(),
            status,
        }
    }

    pub fn mock_archive_info(next_artifact_id: u64, donors: u64) -> ArchiveInfo {
        ArchiveInfo {
            next_artifact_id: U256::from(next_artifact_id),
            balance: U256::from(5_000u64),
            total_donor_count: U256::from(donors),
        }
    }
}
