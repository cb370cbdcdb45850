pub mod transaction;

pub use transaction::{
    BankCode, ChargeMetadata, ChargeStatus, Channel, ParseEnumError, Transaction, TransactionRef,
    is_gateway_id, CHARGE_ID_PREFIX,
};
