//! ABI call builders for the Safe, ERC-20 and allowance module contracts.

use anyhow::{anyhow, Result};
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::types::{Address, Bytes, Signature, H256, U256};

/// Safe operation: plain call
pub const OPERATION_CALL: u8 = 0;

/// The fields hashed and executed by `GnosisSafe.execTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeTransactionData {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: u8,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

impl SafeTransactionData {
    /// A plain call with no refund parameters, the shape used for transfers
    pub fn call(to: Address, value: U256, data: Bytes, nonce: U256) -> Self {
        Self {
            to,
            value,
            data,
            operation: OPERATION_CALL,
            safe_tx_gas: U256::zero(),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
            nonce,
        }
    }

    fn head_tokens(&self) -> Vec<Token> {
        vec![
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::Bytes(self.data.to_vec()),
            Token::Uint(U256::from(self.operation)),
            Token::Uint(self.safe_tx_gas),
            Token::Uint(self.base_gas),
            Token::Uint(self.gas_price),
            Token::Address(self.gas_token),
            Token::Address(self.refund_receiver),
        ]
    }
}

#[allow(deprecated)]
fn function(
    name: &str,
    inputs: &[(&str, ParamType)],
    outputs: &[ParamType],
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs: inputs
            .iter()
            .map(|(param_name, kind)| Param {
                name: param_name.to_string(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|kind| Param {
                name: String::new(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        constant: None,
        state_mutability,
    }
}

fn safe_tx_params(last: (&'static str, ParamType)) -> Vec<(&'static str, ParamType)> {
    vec![
        ("to", ParamType::Address),
        ("value", ParamType::Uint(256)),
        ("data", ParamType::Bytes),
        ("operation", ParamType::Uint(8)),
        ("safeTxGas", ParamType::Uint(256)),
        ("baseGas", ParamType::Uint(256)),
        ("gasPrice", ParamType::Uint(256)),
        ("gasToken", ParamType::Address),
        ("refundReceiver", ParamType::Address),
        last,
    ]
}

// ==================== Safe ====================

pub fn get_threshold_fn() -> Function {
    function("getThreshold", &[], &[ParamType::Uint(256)], StateMutability::View)
}

pub fn get_owners_fn() -> Function {
    function(
        "getOwners",
        &[],
        &[ParamType::Array(Box::new(ParamType::Address))],
        StateMutability::View,
    )
}

pub fn nonce_fn() -> Function {
    function("nonce", &[], &[ParamType::Uint(256)], StateMutability::View)
}

pub fn get_transaction_hash_fn() -> Function {
    function(
        "getTransactionHash",
        &safe_tx_params(("_nonce", ParamType::Uint(256))),
        &[ParamType::FixedBytes(32)],
        StateMutability::View,
    )
}

pub fn exec_transaction_fn() -> Function {
    function(
        "execTransaction",
        &safe_tx_params(("signatures", ParamType::Bytes)),
        &[ParamType::Bool],
        StateMutability::Payable,
    )
}

pub fn approve_hash_fn() -> Function {
    function(
        "approveHash",
        &[("hashToApprove", ParamType::FixedBytes(32))],
        &[],
        StateMutability::NonPayable,
    )
}

pub fn encode_get_transaction_hash(tx: &SafeTransactionData) -> Result<Bytes> {
    let mut tokens = tx.head_tokens();
    tokens.push(Token::Uint(tx.nonce));
    Ok(get_transaction_hash_fn().encode_input(&tokens)?.into())
}

pub fn encode_exec_transaction(tx: &SafeTransactionData, signatures: &[u8]) -> Result<Bytes> {
    let mut tokens = tx.head_tokens();
    tokens.push(Token::Bytes(signatures.to_vec()));
    Ok(exec_transaction_fn().encode_input(&tokens)?.into())
}

pub fn encode_approve_hash(hash: H256) -> Result<Bytes> {
    Ok(approve_hash_fn()
        .encode_input(&[Token::FixedBytes(hash.as_bytes().to_vec())])?
        .into())
}

/// Signature accepted by the Safe when `msg.sender` is the owner itself:
/// r = owner (left padded), s = 0, v = 1.
pub fn prevalidated_signature(owner: Address) -> Vec<u8> {
    [
        [0u8; 12].as_slice(),
        owner.as_bytes(),
        [0u8; 32].as_slice(),
        [1u8].as_slice(),
    ]
    .concat()
}

/// Owner signature over the Safe transaction hash made with `eth_sign`.
/// The Safe tells these apart from plain ECDSA signatures by `v > 30`.
pub fn eth_sign_signature(signature: &Signature) -> Vec<u8> {
    let adjusted = Signature {
        r: signature.r,
        s: signature.s,
        v: signature.v + 4,
    };
    adjusted.to_vec()
}

// ==================== ERC-20 ====================

pub fn erc20_transfer_fn() -> Function {
    function(
        "transfer",
        &[("to", ParamType::Address), ("value", ParamType::Uint(256))],
        &[ParamType::Bool],
        StateMutability::NonPayable,
    )
}

pub fn encode_erc20_transfer(recipient: Address, amount: U256) -> Result<Bytes> {
    Ok(erc20_transfer_fn()
        .encode_input(&[Token::Address(recipient), Token::Uint(amount)])?
        .into())
}

// ==================== Allowance module ====================

/// Arguments of `AllowanceModule.executeAllowanceTransfer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceTransfer {
    pub safe: Address,
    /// Zero address for the native coin
    pub token: Address,
    pub to: Address,
    pub amount: U256,
    pub payment_token: Address,
    pub payment: U256,
    pub delegate: Address,
    pub signature: Bytes,
}

pub fn execute_allowance_transfer_fn() -> Function {
    function(
        "executeAllowanceTransfer",
        &[
            ("safe", ParamType::Address),
            ("token", ParamType::Address),
            ("to", ParamType::Address),
            ("amount", ParamType::Uint(96)),
            ("paymentToken", ParamType::Address),
            ("payment", ParamType::Uint(96)),
            ("delegate", ParamType::Address),
            ("signature", ParamType::Bytes),
        ],
        &[],
        StateMutability::NonPayable,
    )
}

pub fn get_tokens_fn() -> Function {
    function(
        "getTokens",
        &[("safe", ParamType::Address), ("delegate", ParamType::Address)],
        &[ParamType::Array(Box::new(ParamType::Address))],
        StateMutability::View,
    )
}

pub fn get_token_allowance_fn() -> Function {
    function(
        "getTokenAllowance",
        &[
            ("safe", ParamType::Address),
            ("delegate", ParamType::Address),
            ("token", ParamType::Address),
        ],
        &[ParamType::FixedArray(Box::new(ParamType::Uint(256)), 5)],
        StateMutability::View,
    )
}

/// uint96 bound used by the allowance module
fn max_uint96() -> U256 {
    (U256::one() << 96) - 1
}

pub fn encode_execute_allowance_transfer(transfer: &AllowanceTransfer) -> Result<Bytes> {
    if transfer.amount > max_uint96() || transfer.payment > max_uint96() {
        return Err(anyhow!("Allowance transfer amount exceeds uint96"));
    }
    Ok(execute_allowance_transfer_fn()
        .encode_input(&[
            Token::Address(transfer.safe),
            Token::Address(transfer.token),
            Token::Address(transfer.to),
            Token::Uint(transfer.amount),
            Token::Address(transfer.payment_token),
            Token::Uint(transfer.payment),
            Token::Address(transfer.delegate),
            Token::Bytes(transfer.signature.to_vec()),
        ])?
        .into())
}

// ==================== decoding helpers ====================

pub fn decode_uint(func: &Function, output: &[u8]) -> Result<U256> {
    func.decode_output(output)?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| anyhow!("{} returned no uint", func.name))
}

pub fn decode_addresses(func: &Function, output: &[u8]) -> Result<Vec<Address>> {
    let tokens = func
        .decode_output(output)?
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| anyhow!("{} returned no address array", func.name))?;

    tokens
        .into_iter()
        .map(|t| t.into_address().ok_or_else(|| anyhow!("Expected address in {}", func.name)))
        .collect()
}

pub fn decode_bytes32(func: &Function, output: &[u8]) -> Result<H256> {
    let bytes = func
        .decode_output(output)?
        .into_iter()
        .next()
        .and_then(Token::into_fixed_bytes)
        .ok_or_else(|| anyhow!("{} returned no bytes32", func.name))?;
    Ok(H256::from_slice(&bytes))
}

pub fn decode_uint_array(func: &Function, output: &[u8]) -> Result<Vec<U256>> {
    let tokens = func
        .decode_output(output)?
        .into_iter()
        .next()
        .and_then(|t| match t {
            Token::FixedArray(items) | Token::Array(items) => Some(items),
            _ => None,
        })
        .ok_or_else(|| anyhow!("{} returned no uint array", func.name))?;

    tokens
        .into_iter()
        .map(|t| t.into_uint().ok_or_else(|| anyhow!("Expected uint in {}", func.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;

    fn address(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_selectors_match_known_values() {
        assert_eq!(get_threshold_fn().short_signature(), [0xe7, 0x52, 0x35, 0xb8]);
        assert_eq!(get_owners_fn().short_signature(), [0xa0, 0xe6, 0x7e, 0x2b]);
        assert_eq!(nonce_fn().short_signature(), [0xaf, 0xfe, 0xd0, 0xe0]);
        assert_eq!(erc20_transfer_fn().short_signature(), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(exec_transaction_fn().short_signature(), [0x6a, 0x76, 0x12, 0x02]);
        assert_eq!(approve_hash_fn().short_signature(), [0xd4, 0xd9, 0xbd, 0xcd]);
    }

    #[test]
    fn test_encode_erc20_transfer_layout() {
        let data = encode_erc20_transfer(address(0x11), U256::from(1_000u64)).unwrap();
        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(&data[16..36], address(0x11).as_bytes());
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(1_000u64));
    }

    #[test]
    fn test_prevalidated_signature_layout() {
        let owner = address(0xab);
        let sig = prevalidated_signature(owner);
        assert_eq!(sig.len(), 65);
        assert_eq!(&sig[..12], &[0u8; 12]);
        assert_eq!(&sig[12..32], owner.as_bytes());
        assert_eq!(&sig[32..64], &[0u8; 32]);
        assert_eq!(sig[64], 1);
    }

    #[test]
    fn test_eth_sign_signature_shifts_v() {
        let signature = Signature {
            r: U256::from(1u64),
            s: U256::from(2u64),
            v: 27,
        };
        let bytes = eth_sign_signature(&signature);
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[31], 1);
        assert_eq!(bytes[63], 2);
        assert_eq!(bytes[64], 31);
    }

    #[test]
    fn test_encode_execute_allowance_transfer_rejects_overflow() {
        let transfer = AllowanceTransfer {
            safe: address(1),
            token: Address::zero(),
            to: address(2),
            amount: U256::one() << 96,
            payment_token: Address::zero(),
            payment: U256::zero(),
            delegate: address(3),
            signature: Bytes::new(),
        };
        assert!(encode_execute_allowance_transfer(&transfer).is_err());

        let ok = AllowanceTransfer {
            amount: U256::from(5u64),
            ..transfer
        };
        let data = encode_execute_allowance_transfer(&ok).unwrap();
        assert_eq!(&data[..4], &execute_allowance_transfer_fn().short_signature());
    }

    #[test]
    fn test_decode_uint() {
        let output = encode(&[Token::Uint(U256::from(2u64))]);
        assert_eq!(decode_uint(&get_threshold_fn(), &output).unwrap(), U256::from(2u64));
    }

    #[test]
    fn test_decode_addresses() {
        let output = encode(&[Token::Array(vec![
            Token::Address(address(1)),
            Token::Address(address(2)),
        ])]);
        let owners = decode_addresses(&get_owners_fn(), &output).unwrap();
        assert_eq!(owners, vec![address(1), address(2)]);
    }

    #[test]
    fn test_decode_uint_array() {
        let values: Vec<Token> = (1u64..=5).map(|v| Token::Uint(U256::from(v))).collect();
        let output = encode(&[Token::FixedArray(values)]);
        let decoded = decode_uint_array(&get_token_allowance_fn(), &output).unwrap();
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[4], U256::from(5u64));
    }

    #[test]
    fn test_decode_uint_rejects_empty_output() {
        assert!(decode_uint(&get_threshold_fn(), &[]).is_err());
    }
}
