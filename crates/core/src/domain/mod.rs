pub mod approval;
pub mod budget;
pub mod line_item;
