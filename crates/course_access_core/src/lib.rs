pub mod access;
pub mod domain;
pub mod ports;
pub mod progress;
pub mod statistics;
pub mod validation;

pub use access::AccessResolver;
pub use domain::{
    AuthSession, Lesson, LessonChanges, LessonProgress, LessonViewChanges, NewLesson,
    NewLessonView, NewProduct, Product, ProductChanges, ProductLessons, ProductStatistics,
    ProductSummary, ProductTotals, ProgressWrite, User, UserCredentials, UserLessonView,
    ViewedRule,
};
pub use ports::{DatabaseService, PortError, PortResult};
pub use progress::ProgressRecorder;
pub use statistics::StatisticsAggregator;
