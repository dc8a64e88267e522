pub mod m202606010001_create_instructors;
pub mod m202606010002_create_students;
pub mod m202606010003_create_instructor_rates;
pub mod m202606010004_create_cycles;
pub mod m202606010005_create_meetings;
pub mod m202606010006_create_registrations;
pub mod m202606010007_create_attendance_records;
