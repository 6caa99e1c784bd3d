use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use user_service::{
    clients::error::MessagingError,
    metrics::MetricsSink,
    models::{
        event::EventEnvelope,
        status::{DeliveryOutcome, Outcome},
        user::User,
    },
    usecases::{
        ports::{EventPublisher, PasswordHasher, RepositoryError, UserRepository},
        service::UserService,
        user::{
            CreateUserUseCase, DeleteUserUseCase, GetUserUseCase, ListUsersUseCase,
            UpdateUserUseCase,
        },
    },
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn find(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("connection reset".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        self.check_reads()?;
        self.find(id).ok_or(RepositoryError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, RepositoryError> {
        self.check_reads()?;
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.check_writes()?;
        self.users
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError> {
        self.check_reads()?;
        let mut users: Vec<User> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|envelope| envelope.event_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_event(&self, envelope: EventEnvelope) -> Result<(), MessagingError> {
        self.events.lock().unwrap().push(envelope);
        Ok(())
    }
}

/// Behaves like a publisher whose channel has gone away.
#[derive(Default)]
pub struct FailingPublisher {
    attempts: Mutex<u32>,
}

impl FailingPublisher {
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish_event(&self, _envelope: EventEnvelope) -> Result<(), MessagingError> {
        *self.attempts.lock().unwrap() += 1;
        Err(MessagingError::ChannelClosed)
    }
}

pub struct FakeHasher;

impl PasswordHasher for FakeHasher {
    fn hash(&self, password: &str) -> Result<String, anyhow::Error> {
        Ok(format!("hashed:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash == format!("hashed:{password}")
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub published: Mutex<Vec<(String, Outcome)>>,
    pub consumed: Mutex<Vec<(String, DeliveryOutcome)>>,
    pub operations: Mutex<Vec<(String, Outcome)>>,
}

impl RecordingMetrics {
    pub fn operations(&self) -> Vec<(String, Outcome)> {
        self.operations.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn event_published(&self, event_type: &str, outcome: Outcome) {
        self.published
            .lock()
            .unwrap()
            .push((event_type.to_string(), outcome));
    }

    fn event_consumed(&self, event_type: &str, outcome: DeliveryOutcome) {
        self.consumed
            .lock()
            .unwrap()
            .push((event_type.to_string(), outcome));
    }

    fn operation(&self, operation: &str, outcome: Outcome, _elapsed: Duration) {
        self.operations
            .lock()
            .unwrap()
            .push((operation.to_string(), outcome));
    }
}

pub fn sample_user(email: &str, name: &str) -> User {
    let mut user = User::new(email, name, "password123", &FakeHasher).unwrap();
    user.id = Uuid::new_v4();
    user
}

/// Every use case wired to the same fakes.
pub struct Harness {
    pub repo: Arc<InMemoryUserRepository>,
    pub metrics: Arc<RecordingMetrics>,
    pub create: CreateUserUseCase,
    pub get: GetUserUseCase,
    pub list: ListUsersUseCase,
    pub update: UpdateUserUseCase,
    pub delete: DeleteUserUseCase,
}

impl Harness {
    pub fn new(repo: InMemoryUserRepository, publisher: Arc<dyn EventPublisher>) -> Self {
        let repo = Arc::new(repo);
        let metrics = Arc::new(RecordingMetrics::default());

        let port: Arc<dyn UserRepository> = repo.clone();
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        let service = UserService::new(port.clone());

        Self {
            create: CreateUserUseCase::new(
                port.clone(),
                service.clone(),
                publisher.clone(),
                Arc::new(FakeHasher),
                sink.clone(),
            ),
            get: GetUserUseCase::new(port.clone(), sink.clone()),
            list: ListUsersUseCase::new(port.clone(), sink.clone()),
            update: UpdateUserUseCase::new(port.clone(), publisher.clone(), sink.clone()),
            delete: DeleteUserUseCase::new(port, service, publisher, sink),
            repo,
            metrics,
        }
    }
}
