//! Contract simulation used by tests: one factory plus any number of
//! archives, with the same admin rules the deployed contracts enforce.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use data_model::{
    test_objects::tests::{test_archive_address, TEST_ARCHIVE_DESCRIPTION, TEST_ARCHIVE_NAME},
    ArchiveInfo,
    ArtifactRecord,
    ArtifactStatus,
    DonorEntry,
};
use ethers::types::{Address, H256, U256};

use crate::{
    backend::{ArchiveBackend, Confirmed},
    error::{ChainError, ChainResult},
};

#[derive(Debug, Clone)]
struct ArchiveState {
    name: String,
    description: String,
    admin: Address,
    balance: U256,
    donors: Vec<DonorEntry>,
    artifacts: Vec<ArtifactRecord>,
}

struct InjectedFailure {
    error: ChainError,
    remaining: u32,
}

pub struct InMemoryArchives {
    factory: Address,
    archives: Mutex<Vec<Address>>,
    state: Mutex<HashMap<Address, ArchiveState>>,
    caller: Mutex<Address>,
    calls: Mutex<HashMap<&'static str, u32>>,
    failures: Mutex<HashMap<&'static str, InjectedFailure>>,
    block: AtomicU64,
}

impl Default for InMemoryArchives {
    fn default() -> Self {
        Self {
            factory: Address::repeat_byte(0xfa),
            archives: Mutex::new(Vec::new()),
            state: Mutex::new(HashMap::new()),
            caller: Mutex::new(Address::repeat_byte(0x11)),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            block: AtomicU64::new(100),
        }
    }
}

impl InMemoryArchives {
    /// Address the simulated transactions are sent from.
    pub fn set_caller(&self, caller: Address) {
        *self.caller.lock().unwrap() = caller;
    }

    pub fn seed_archive(&self, admin: Address) -> Address {
        let mut archives = self.archives.lock().unwrap();
        let address = test_archive_address(archives.len() as u8);
        archives.push(address);
        self.state.lock().unwrap().insert(
            address,
            ArchiveState {
                name: TEST_ARCHIVE_NAME.to_string(),
                description: TEST_ARCHIVE_DESCRIPTION.to_string(),
                admin,
                balance: U256::zero(),
                donors: Vec::new(),
                artifacts: Vec::new(),
            },
        );
        address
    }

    pub fn seed_donors(&self, archive: Address, donors: Vec<DonorEntry>) {
        let mut state = self.state.lock().unwrap();
        let archive = state.get_mut(&archive).unwrap();
        archive.balance += donors
            .iter()
            .fold(U256::zero(), |acc, d| acc + d.total_donated);
        archive.donors = donors;
    }

    pub fn seed_artifact(&self, archive: Address, title: &str, status: ArtifactStatus) -> U256 {
        let mut state = self.state.lock().unwrap();
        let archive = state.get_mut(&archive).unwrap();
        let id = U256::from(archive.artifacts.len());
        archive.artifacts.push(ArtifactRecord {
            id,
            title: title.to_string(),
            uri: format!("https://arweave.net/{}", title),
            mime_type: "image/png".to_string(),
            timestamp: U256::from(1_700_000_000u64),
            submitter: *self.caller.lock().unwrap(),
            status,
        });
        id
    }

    /// Makes the next `times` calls of `function` fail with `error`.
    pub fn fail_reads(&self, function: &'static str, error: ChainError, times: u32) {
        self.failures.lock().unwrap().insert(
            function,
            InjectedFailure {
                error,
                remaining: times,
            },
        );
    }

    pub fn calls(&self, function: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(function)
            .copied()
            .unwrap_or_default()
    }

    fn enter(&self, function: &'static str) -> ChainResult<()> {
        *self.calls.lock().unwrap().entry(function).or_default() += 1;
        let mut failures = self.failures.lock().unwrap();
        if let Some(failure) = failures.get_mut(function) {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(failure.error.clone());
            }
        }
        Ok(())
    }

    fn with_archive<T>(
        &self,
        function: &'static str,
        archive: Address,
        f: impl FnOnce(&ArchiveState) -> ChainResult<T>,
    ) -> ChainResult<T> {
        self.enter(function)?;
        let state = self.state.lock().unwrap();
        let archive = state.get(&archive).ok_or_else(|| ChainError::ContractRead {
            function,
            message: "returned no data (\"0x\")".to_string(),
        })?;
        f(archive)
    }

    fn write<T>(
        &self,
        function: &'static str,
        archive: Address,
        f: impl FnOnce(&mut ArchiveState, Address) -> Result<T, &'static str>,
    ) -> ChainResult<Confirmed<T>> {
        self.enter(function)?;
        let caller = *self.caller.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        let archive = state
            .get_mut(&archive)
            .ok_or_else(|| ChainError::write_rejected(function, "no contract at address"))?;
        let value = f(archive, caller).map_err(|reason| {
            ChainError::write_rejected(function, format!("execution reverted: {}", reason))
        })?;
        Ok(self.confirm(value))
    }

    fn confirm<T>(&self, value: T) -> Confirmed<T> {
        let block = self.block.fetch_add(1, Ordering::SeqCst);
        Confirmed {
            tx_hash: H256::from_low_u64_be(block),
            block_number: Some(block),
            value,
        }
    }
}

fn only_admin(archive: &ArchiveState, caller: Address) -> Result<(), &'static str> {
    if archive.admin != caller {
        return Err("Only admin");
    }
    Ok(())
}

fn pending_artifact(archive: &mut ArchiveState, id: U256) -> Result<&mut ArtifactRecord, &'static str> {
    if id >= U256::from(archive.artifacts.len()) {
        return Err("Invalid artifact id");
    }
    let artifact = &mut archive.artifacts[id.as_usize()];
    if artifact.status != ArtifactStatus::Pending {
        return Err("Artifact not pending");
    }
    Ok(artifact)
}

#[async_trait]
impl ArchiveBackend for InMemoryArchives {
    fn factory_address(&self) -> Address {
        self.factory
    }

    async fn name(&self, archive: Address) -> ChainResult<String> {
        self.with_archive("name", archive, |a| Ok(a.name.clone()))
    }

    async fn description(&self, archive: Address) -> ChainResult<String> {
        self.with_archive("description", archive, |a| Ok(a.description.clone()))
    }

    async fn admin(&self, archive: Address) -> ChainResult<Address> {
        self.with_archive("admin", archive, |a| Ok(a.admin))
    }

    async fn archive_info(&self, archive: Address) -> ChainResult<ArchiveInfo> {
        self.with_archive("getArchiveInfo", archive, |a| {
            Ok(ArchiveInfo {
                next_artifact_id: U256::from(a.artifacts.len()),
                balance: a.balance,
                total_donor_count: U256::from(a.donors.len()),
            })
        })
    }

    async fn donors(
        &self,
        archive: Address,
        offset: U256,
        limit: U256,
    ) -> ChainResult<Vec<DonorEntry>> {
        self.with_archive("getDonors", archive, |a| {
            let len = a.donors.len();
            let start = offset.min(U256::from(len)).as_usize();
            let end = (offset.saturating_add(limit)).min(U256::from(len)).as_usize();
            Ok(a.donors[start..end].to_vec())
        })
    }

    async fn artifact(&self, archive: Address, id: U256) -> ChainResult<ArtifactRecord> {
        self.with_archive("getArtifact", archive, |a| {
            if id >= U256::from(a.artifacts.len()) {
                return Err(ChainError::ContractRead {
                    function: "getArtifact",
                    message: "execution reverted: Invalid artifact id".to_string(),
                });
            }
            Ok(a.artifacts[id.as_usize()].clone())
        })
    }

    async fn total_artifacts(&self, archive: Address) -> ChainResult<U256> {
        self.with_archive("getTotalArtifacts", archive, |a| {
            Ok(U256::from(a.artifacts.len()))
        })
    }

    async fn total_archives(&self) -> ChainResult<U256> {
        self.enter("totalArchives")?;
        Ok(U256::from(self.archives.lock().unwrap().len()))
    }

    async fn archive_at(&self, index: U256) -> ChainResult<Address> {
        self.enter("archives")?;
        let archives = self.archives.lock().unwrap();
        if index >= U256::from(archives.len()) {
            return Err(ChainError::ContractRead {
                function: "archives",
                message: "execution reverted: index out of bounds".to_string(),
            });
        }
        Ok(archives[index.as_usize()])
    }

    async fn create_archive(
        &self,
        name: &str,
        description: &str,
        _base_uri: &str,
    ) -> ChainResult<Confirmed<Address>> {
        self.enter("createArchive")?;
        let caller = *self.caller.lock().unwrap();
        let address = self.seed_archive(caller);
        {
            let mut state = self.state.lock().unwrap();
            let archive = state
                .get_mut(&address)
                .ok_or_else(|| ChainError::write_rejected("createArchive", "archive vanished"))?;
            archive.name = name.to_string();
            archive.description = description.to_string();
        }
        Ok(self.confirm(address))
    }

    async fn submit_artifact(
        &self,
        archive: Address,
        title: &str,
        uri: &str,
        mime_type: &str,
    ) -> ChainResult<Confirmed<U256>> {
        self.write("submitArtifact", archive, |a, caller| {
            let id = U256::from(a.artifacts.len());
            a.artifacts.push(ArtifactRecord {
                id,
                title: title.to_string(),
                uri: uri.to_string(),
                mime_type: mime_type.to_string(),
                timestamp: U256::from(1_700_000_000u64 + a.artifacts.len() as u64),
                submitter: caller,
                status: ArtifactStatus::Pending,
            });
            Ok(id)
        })
    }

    async fn receive_donation(
        &self,
        archive: Address,
        _message: &str,
        amount: U256,
    ) -> ChainResult<Confirmed<()>> {
        self.write("receiveDonation", archive, |a, caller| {
            if amount.is_zero() {
                return Err("Donation must be positive");
            }
            a.balance += amount;
            match a.donors.iter_mut().find(|d| d.donor == caller) {
                Some(entry) => {
                    entry.total_donated += amount;
                    entry.donation_count += U256::one();
                }
                None => a.donors.push(DonorEntry {
                    donor: caller,
                    total_donated: amount,
                    donation_count: U256::one(),
                }),
            }
            Ok(())
        })
    }

    async fn accept_artifact(
        &self,
        archive: Address,
        id: U256,
        reward_wei: U256,
    ) -> ChainResult<Confirmed<()>> {
        self.write("acceptArtifact", archive, |a, caller| {
            only_admin(a, caller)?;
            if reward_wei > a.balance {
                return Err("Insufficient balance");
            }
            pending_artifact(a, id)?.status = ArtifactStatus::Accepted;
            a.balance -= reward_wei;
            Ok(())
        })
    }

    async fn reject_artifact(&self, archive: Address, id: U256) -> ChainResult<Confirmed<()>> {
        self.write("rejectArtifact", archive, |a, caller| {
            only_admin(a, caller)?;
            pending_artifact(a, id)?.status = ArtifactStatus::Rejected;
            Ok(())
        })
    }

    async fn transfer_admin(
        &self,
        archive: Address,
        new_admin: Address,
    ) -> ChainResult<Confirmed<()>> {
        self.write("transferAdmin", archive, |a, caller| {
            only_admin(a, caller)?;
            if new_admin.is_zero() {
                return Err("Invalid admin");
            }
            a.admin = new_admin;
            Ok(())
        })
    }
}
