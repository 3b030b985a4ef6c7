pub mod advance;
pub mod asset;
pub mod attendance;
pub mod employee;
pub mod holiday;
pub mod leave;
pub mod notification;
pub mod payroll;
pub mod salary;
pub mod shift;
