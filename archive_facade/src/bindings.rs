//! Contract bindings generated from the human-readable ABI of the deployed
//! `Archive` and `ArchiveFactory` contracts.

use ethers::contract::abigen;

abigen!(
    ArchiveContract,
    r#"[
        struct Donor { address donor; uint256 totalDonated; uint256 donationCount; }
        function name() external view returns (string)
        function description() external view returns (string)
        function admin() external view returns (address)
        function getArchiveInfo() external view returns (uint256, uint256, uint256)
        function getDonors(uint256 offset, uint256 limit) external view returns (Donor[])
        function getArtifact(uint256 id) external view returns (string, string, string, uint256, address, uint8)
        function getTotalArtifacts() external view returns (uint256)
        function submitArtifact(string title, string arweaveURI, string mimeType) external returns (uint256)
        function receiveDonation(string message) external payable
        function acceptArtifact(uint256 id, uint256 rewardWei) external
        function rejectArtifact(uint256 id) external
        function transferAdmin(address newAdmin) external
        event ArtifactSubmitted(uint256 indexed id, address indexed submitter)
    ]"#
);

abigen!(
    ArchiveFactoryContract,
    r#"[
        function archives(uint256 index) external view returns (address)
        function createArchive(string name, string description, string baseUri) external returns (address)
        function totalArchives() external view returns (uint256)
        event ArchiveCreated(address indexed archive, string name, address indexed admin)
    ]"#
);
