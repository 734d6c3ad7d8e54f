use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::models::ApprovalEvent;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[sol(rpc)]
    interface ITokenRegistry {
        function getTokenMetaData(address token) external view returns (
            address tokenAddress,
            string name,
            string symbol,
            uint8 decimals,
            bytes ipfsHash,
            bytes swarmHash
        );
    }
}

/// Decodes an ERC-20 `Approval` log.
///
/// ERC-721 emits an `Approval` with the same topic0 but an indexed token id,
/// so those logs fail here and must be skipped by the caller.
pub fn decode_approval_event(log: &Log) -> anyhow::Result<ApprovalEvent> {
    let log_data = log.data();
    let decoded = IERC20::Approval::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(ApprovalEvent {
        contract_address: log.address(),
        owner: decoded.owner,
        spender: decoded.spender,
        value: decoded.value,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}
