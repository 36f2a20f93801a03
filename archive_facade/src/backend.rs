use std::sync::Arc;

use async_trait::async_trait;
use data_model::{ArchiveInfo, ArtifactRecord, DonorEntry};
use ethers::{
    contract::{parse_log, ContractCall, EthLogDecode},
    providers::Middleware,
    types::{Address, TransactionReceipt, H256, U256, U64},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    bindings::{ArchiveContract, ArchiveCreatedFilter, ArchiveFactoryContract, ArtifactSubmittedFilter},
    error::{classify_read_error, ChainError, ChainResult},
};

/// A write that made it into a block with a success status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmed<T> {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub value: T,
}

impl<T> Confirmed<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Confirmed<U> {
        Confirmed {
            tx_hash: self.tx_hash,
            block_number: self.block_number,
            value: f(self.value),
        }
    }
}

/// Raw access to the archive contracts. Every read maps to exactly one view
/// call; every write resolves only once the transaction is confirmed.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    fn factory_address(&self) -> Address;

    async fn name(&self, archive: Address) -> ChainResult<String>;

    async fn description(&self, archive: Address) -> ChainResult<String>;

    async fn admin(&self, archive: Address) -> ChainResult<Address>;

    async fn archive_info(&self, archive: Address) -> ChainResult<ArchiveInfo>;

    /// At most `limit` donors starting at `offset`. Fewer are returned when
    /// the archive has fewer.
    async fn donors(
        &self,
        archive: Address,
        offset: U256,
        limit: U256,
    ) -> ChainResult<Vec<DonorEntry>>;

    async fn artifact(&self, archive: Address, id: U256) -> ChainResult<ArtifactRecord>;

    async fn total_artifacts(&self, archive: Address) -> ChainResult<U256>;

    async fn total_archives(&self) -> ChainResult<U256>;

    async fn archive_at(&self, index: U256) -> ChainResult<Address>;

    async fn create_archive(
        &self,
        name: &str,
        description: &str,
        base_uri: &str,
    ) -> ChainResult<Confirmed<Address>>;

    async fn submit_artifact(
        &self,
        archive: Address,
        title: &str,
        uri: &str,
        mime_type: &str,
    ) -> ChainResult<Confirmed<U256>>;

    async fn receive_donation(
        &self,
        archive: Address,
        message: &str,
        amount: U256,
    ) -> ChainResult<Confirmed<()>>;

    async fn accept_artifact(
        &self,
        archive: Address,
        id: U256,
        reward_wei: U256,
    ) -> ChainResult<Confirmed<()>>;

    async fn reject_artifact(&self, archive: Address, id: U256) -> ChainResult<Confirmed<()>>;

    async fn transfer_admin(&self, archive: Address, new_admin: Address)
        -> ChainResult<Confirmed<()>>;
}

/// [`ArchiveBackend`] over a JSON-RPC node. Reads work with any middleware;
/// writes need one that can sign.
pub struct EthersBackend<M> {
    client: Arc<M>,
    factory: ArchiveFactoryContract<M>,
}

impl<M: Middleware + 'static> EthersBackend<M> {
    pub fn new(client: Arc<M>, factory_address: Address) -> Self {
        let factory = ArchiveFactoryContract::new(factory_address, client.clone());
        Self { client, factory }
    }

    fn archive(&self, address: Address) -> ArchiveContract<M> {
        ArchiveContract::new(address, self.client.clone())
    }

    async fn view<D>(&self, function: &'static str, call: ContractCall<M, D>) -> ChainResult<D>
    where
        D: ethers::abi::Detokenize + Send + Sync,
    {
        call.call()
            .await
            .map_err(|e| classify_read_error(function, e))
    }

    async fn confirm<D>(
        &self,
        function: &'static str,
        call: ContractCall<M, D>,
    ) -> ChainResult<TransactionReceipt>
    where
        D: ethers::abi::Detokenize + Send + Sync,
    {
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::write_rejected(function, e))?;
        let tx_hash = pending.tx_hash();
        debug!(function, ?tx_hash, "transaction submitted, awaiting receipt");
        let receipt = pending
            .await
            .map_err(|e| ChainError::write_rejected(function, e))?;
        let receipt = check_receipt(function, tx_hash, receipt)?;
        info!(
            function,
            ?tx_hash,
            block = ?receipt.block_number,
            "transaction confirmed"
        );
        Ok(receipt)
    }
}

/// A write counts only when its receipt exists and carries a success status.
fn check_receipt(
    function: &'static str,
    tx_hash: H256,
    receipt: Option<TransactionReceipt>,
) -> ChainResult<TransactionReceipt> {
    let receipt =
        receipt.ok_or_else(|| ChainError::write_rejected(function, "transaction dropped"))?;
    if receipt.status != Some(U64::from(1)) {
        return Err(ChainError::write_rejected(
            function,
            format!("transaction {:?} reverted", tx_hash),
        ));
    }
    Ok(receipt)
}

fn confirmed<T>(receipt: &TransactionReceipt, value: T) -> Confirmed<T> {
    Confirmed {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.map(|b| b.as_u64()),
        value,
    }
}

/// First log in the receipt emitted by `emitter` that decodes as `E`.
pub fn find_event<E: EthLogDecode>(receipt: &TransactionReceipt, emitter: Address) -> Option<E> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == emitter)
        .find_map(|log| parse_log::<E>(log.clone()).ok())
}

fn created_archive(receipt: &TransactionReceipt, factory: Address) -> ChainResult<Address> {
    find_event::<ArchiveCreatedFilter>(receipt, factory)
        .map(|event| event.archive)
        .ok_or_else(|| {
            ChainError::write_rejected("createArchive", "no ArchiveCreated event in receipt")
        })
}

fn submitted_artifact(receipt: &TransactionReceipt, archive: Address) -> ChainResult<U256> {
    find_event::<ArtifactSubmittedFilter>(receipt, archive)
        .map(|event| event.id)
        .ok_or_else(|| {
            ChainError::write_rejected("submitArtifact", "no ArtifactSubmitted event in receipt")
        })
}

#[async_trait]
impl<M: Middleware + 'static> ArchiveBackend for EthersBackend<M> {
    fn factory_address(&self) -> Address {
        self.factory.address()
    }

    async fn name(&self, archive: Address) -> ChainResult<String> {
        self.view("name", self.archive(archive).name()).await
    }

    async fn description(&self, archive: Address) -> ChainResult<String> {
        self.view("description", self.archive(archive).description())
            .await
    }

    async fn admin(&self, archive: Address) -> ChainResult<Address> {
        self.view("admin", self.archive(archive).admin()).await
    }

    async fn archive_info(&self, archive: Address) -> ChainResult<ArchiveInfo> {
        self.view("getArchiveInfo", self.archive(archive).get_archive_info())
            .await
            .map(ArchiveInfo::from)
    }

    async fn donors(
        &self,
        archive: Address,
        offset: U256,
        limit: U256,
    ) -> ChainResult<Vec<DonorEntry>> {
        let donors = self
            .view("getDonors", self.archive(archive).get_donors(offset, limit))
            .await?;
        Ok(donors
            .into_iter()
            .map(|(donor, total_donated, donation_count)| DonorEntry::from((donor, total_donated, donation_count)))
            .collect())
    }

    async fn artifact(&self, archive: Address, id: U256) -> ChainResult<ArtifactRecord> {
        let raw = self
            .view("getArtifact", self.archive(archive).get_artifact(id))
            .await?;
        ArtifactRecord::from_tuple(id, raw).map_err(|e| ChainError::ContractRead {
            function: "getArtifact",
            message: e.to_string(),
        })
    }

    async fn total_artifacts(&self, archive: Address) -> ChainResult<U256> {
        self.view("getTotalArtifacts", self.archive(archive).get_total_artifacts())
            .await
    }

    async fn total_archives(&self) -> ChainResult<U256> {
        self.view("totalArchives", self.factory.total_archives())
            .await
    }

    async fn archive_at(&self, index: U256) -> ChainResult<Address> {
        self.view("archives", self.factory.archives(index)).await
    }

    async fn create_archive(
        &self,
        name: &str,
        description: &str,
        base_uri: &str,
    ) -> ChainResult<Confirmed<Address>> {
        let call = self.factory.create_archive(
            name.to_string(),
            description.to_string(),
            base_uri.to_string(),
        );
        let receipt = self.confirm("createArchive", call).await?;
        let archive = created_archive(&receipt, self.factory.address())?;
        Ok(confirmed(&receipt, archive))
    }

    async fn submit_artifact(
        &self,
        archive: Address,
        title: &str,
        uri: &str,
        mime_type: &str,
    ) -> ChainResult<Confirmed<U256>> {
        let call = self.archive(archive).submit_artifact(
            title.to_string(),
            uri.to_string(),
            mime_type.to_string(),
        );
        let receipt = self.confirm("submitArtifact", call).await?;
        let id = submitted_artifact(&receipt, archive)?;
        Ok(confirmed(&receipt, id))
    }

    async fn receive_donation(
        &self,
        archive: Address,
        message: &str,
        amount: U256,
    ) -> ChainResult<Confirmed<()>> {
        let call = self
            .archive(archive)
            .receive_donation(message.to_string())
            .value(amount);
        let receipt = self.confirm("receiveDonation", call).await?;
        Ok(confirmed(&receipt, ()))
    }

    async fn accept_artifact(
        &self,
        archive: Address,
        id: U256,
        reward_wei: U256,
    ) -> ChainResult<Confirmed<()>> {
        let call = self.archive(archive).accept_artifact(id, reward_wei);
        let receipt = self.confirm("acceptArtifact", call).await?;
        Ok(confirmed(&receipt, ()))
    }

    async fn reject_artifact(&self, archive: Address, id: U256) -> ChainResult<Confirmed<()>> {
        let call = self.archive(archive).reject_artifact(id);
        let receipt = self.confirm("rejectArtifact", call).await?;
        Ok(confirmed(&receipt, ()))
    }

    async fn transfer_admin(
        &self,
        archive: Address,
        new_admin: Address,
    ) -> ChainResult<Confirmed<()>> {
        let call = self.archive(archive).transfer_admin(new_admin);
        let receipt = self.confirm("transferAdmin", call).await?;
        Ok(confirmed(&receipt, ()))
    }
}
