//! Mock sharing backend
//!
//! Records every call the integration makes and lets tests push device and
//! token changes through the registered listeners, the way the SDK's worker
//! threads would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ha_tuya::{
    same_listener, CustomerDevice, ManagerCredentials, ManagerFactory, SharingDeviceListener,
    SharingError, SharingManager, SharingTokenListener,
};

/// Build a device as the backend would report it
pub fn device(id: &str) -> CustomerDevice {
    CustomerDevice {
        id: id.to_string(),
        name: format!("Device {id}"),
        product_name: "Smart Plug".to_string(),
        status: HashMap::new(),
    }
}

#[derive(Default)]
struct MockState {
    remote_devices: Vec<CustomerDevice>,
    cache: HashMap<String, CustomerDevice>,
    listeners: Vec<Arc<dyn SharingDeviceListener>>,
    calls: Vec<&'static str>,
    mq_running: bool,
    fail_cache: Option<SharingError>,
    fail_report: bool,
    fail_mq: bool,
}

/// A scripted sharing session
pub struct MockManager {
    pub credentials: ManagerCredentials,
    token_listener: Arc<dyn SharingTokenListener>,
    state: Mutex<MockState>,
}

impl MockManager {
    fn new(
        credentials: ManagerCredentials,
        token_listener: Arc<dyn SharingTokenListener>,
        remote_devices: Vec<CustomerDevice>,
    ) -> Self {
        Self {
            credentials,
            token_listener,
            state: Mutex::new(MockState {
                remote_devices,
                ..Default::default()
            }),
        }
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    pub fn set_remote_devices(&self, devices: Vec<CustomerDevice>) {
        self.state.lock().unwrap().remote_devices = devices;
    }

    pub fn fail_device_cache(&self, err: Option<SharingError>) {
        self.state.lock().unwrap().fail_cache = err;
    }

    pub fn fail_push_channel(&self, fail: bool) {
        self.state.lock().unwrap().fail_mq = fail;
    }

    pub fn fail_version_report(&self) {
        self.state.lock().unwrap().fail_report = true;
    }

    fn listeners(&self) -> Vec<Arc<dyn SharingDeviceListener>> {
        self.state.lock().unwrap().listeners.clone()
    }

    pub fn push_add(&self, device: &CustomerDevice) {
        for listener in self.listeners() {
            listener.add_device(device);
        }
    }

    pub fn push_update(&self, device: &CustomerDevice) {
        for listener in self.listeners() {
            listener.update_device(device);
        }
    }

    pub fn push_remove(&self, device_id: &str) {
        for listener in self.listeners() {
            listener.remove_device(device_id);
        }
    }

    pub fn push_token(&self, token_info: serde_json::Value) {
        self.token_listener.update_token(token_info);
    }

    fn record(&self, call: &'static str) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl SharingManager for MockManager {
    fn update_device_cache(&self) -> Result<(), SharingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("update_device_cache");
        if let Some(err) = state.fail_cache.clone() {
            return Err(err);
        }
        state.cache = state
            .remote_devices
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();
        Ok(())
    }

    fn device_map(&self) -> HashMap<String, CustomerDevice> {
        self.state.lock().unwrap().cache.clone()
    }

    fn add_device_listener(&self, listener: Arc<dyn SharingDeviceListener>) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("add_device_listener");
        state.listeners.push(listener);
    }

    fn remove_device_listener(&self, listener: &Arc<dyn SharingDeviceListener>) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("remove_device_listener");
        state.listeners.retain(|l| !same_listener(l, listener));
    }

    fn refresh_mq(&self) -> Result<(), SharingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("refresh_mq");
        if state.fail_mq {
            return Err(SharingError::PushChannel("broker unreachable".into()));
        }
        state.mq_running = true;
        Ok(())
    }

    fn is_mq_running(&self) -> bool {
        self.state.lock().unwrap().mq_running
    }

    fn stop_mq(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("stop_mq");
        state.mq_running = false;
    }

    fn unload(&self) {
        self.record("unload");
    }

    fn report_version(
        &self,
        _ha_version: &str,
        _integration_version: &str,
        _sdk_version: &str,
    ) -> Result<(), SharingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("report_version");
        if state.fail_report {
            return Err(SharingError::Request {
                endpoint: "https://apigw.tuyaus.com".into(),
                message: "report rejected".into(),
            });
        }
        Ok(())
    }
}

/// Builds [`MockManager`]s and keeps every one it built
#[derive(Default)]
pub struct MockFactory {
    remote_devices: Mutex<Vec<CustomerDevice>>,
    created: Mutex<Vec<Arc<MockManager>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Devices the next managers will report
    pub fn with_devices(self: Arc<Self>, ids: &[&str]) -> Arc<Self> {
        *self.remote_devices.lock().unwrap() = ids.iter().map(|id| device(id)).collect();
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Most recently built manager
    pub fn last(&self) -> Arc<MockManager> {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no manager created")
    }
}

impl ManagerFactory for MockFactory {
    fn create(
        &self,
        credentials: ManagerCredentials,
        token_listener: Arc<dyn SharingTokenListener>,
    ) -> Arc<dyn SharingManager> {
        let remote = self.remote_devices.lock().unwrap().clone();
        let manager = Arc::new(MockManager::new(credentials, token_listener, remote));
        self.created.lock().unwrap().push(manager.clone());
        manager
    }
}
