pub mod checksum;
pub mod result;
pub mod row_group;
