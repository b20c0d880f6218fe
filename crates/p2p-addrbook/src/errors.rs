use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressBookError {
    #[error("address book has no other peer's own address")]
    SelfAddress,
    #[error("address is not routable and cannot be served over PEX")]
    NotRoutable,
    #[error("address book storage error: {0}")]
    Io(String),
}
