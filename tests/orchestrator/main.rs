
mod provisioning;
mod steps;
