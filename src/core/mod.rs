pub mod access;
pub mod assignment;
pub mod expense;
pub mod invitation;
pub mod ledger;
pub mod profile;
pub mod receipt;
pub mod shares;
pub mod tab;
