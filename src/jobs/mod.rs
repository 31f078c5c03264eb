pub mod quota_reset;
