pub mod job_item;
