pub mod attendance_record;
pub mod cycle;
pub mod instructor;
pub mod instructor_rate;
pub mod meeting;
pub mod registration;
pub mod student;

pub use attendance_record::Entity as AttendanceRecord;
pub use cycle::Entity as Cycle;
pub use instructor::Entity as Instructor;
pub use instructor_rate::Entity as InstructorRate;
pub use meeting::Entity as Meeting;
pub use registration::Entity as Registration;
pub use student::Entity as Student;
