// Fleet reconciliation
pub mod run;

// Policy table inspection
pub mod policy;
