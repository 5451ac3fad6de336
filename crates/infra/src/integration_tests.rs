//! Integration tests for the full replication pipeline.
//!
//! Tests: owning service → producer → bus → consumer workers → replica store → order service
//!
//! Verifies:
//! - Committed customer/product changes become local replicas
//! - Orders only resolve references that have been replicated
//! - Poison messages are dead-lettered without stalling the partition
//! - A restarted consumer group resumes from its last acknowledged delivery

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use storefront_core::{CustomerId, Entity, ProductId};
    use storefront_customers::CustomerDraft;
    use storefront_events::{
        EntityType, EventBus, InMemoryEventBus, KeyedMessage, SubscriptionSpec, TopicConfig,
    };
    use storefront_orders::{CustomerReplica, OrderDraft, OrderLine, OrderStatus, ProductReplica};
    use storefront_products::ProductDraft;

    use crate::config::ReplicationConfig;
    use crate::orders::{InMemoryOrderStore, OrderService};
    use crate::producer::ChangeProducer;
    use crate::replica_store::{InMemoryReplicaStore, ReplicaStore};
    use crate::replication::{Replication, ReplicationHandle};
    use crate::services::{
        CustomerService, InMemoryCustomerRepository, InMemoryProductRepository, ProductService,
    };

    type Bus = Arc<InMemoryEventBus>;
    type Customers = Arc<InMemoryReplicaStore<CustomerReplica>>;
    type Products = Arc<InMemoryReplicaStore<ProductReplica>>;

    struct System {
        config: ReplicationConfig,
        bus: Bus,
        customer_service: CustomerService<InMemoryCustomerRepository, Bus>,
        product_service: ProductService<InMemoryProductRepository, Bus>,
        customers: Customers,
        products: Products,
        orders: OrderService<Arc<InMemoryOrderStore>, Customers, Products>,
    }

    fn config() -> ReplicationConfig {
        ReplicationConfig {
            redis_url: "redis://unused".to_string(),
            database_url: None,
            topics: TopicConfig {
                partitions: 2,
                ..TopicConfig::default()
            },
            service_name: "order-service".to_string(),
            max_attempts: 2,
            retry_backoff_ms: 1,
            stream_prefix: "test".to_string(),
        }
    }

    fn setup() -> System {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let config = config();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let customers: Customers = Arc::new(InMemoryReplicaStore::new());
        let products: Products = Arc::new(InMemoryReplicaStore::new());

        System {
            customer_service: CustomerService::new(
                InMemoryCustomerRepository::new(),
                ChangeProducer::new(bus.clone(), config.router()),
            ),
            product_service: ProductService::new(
                InMemoryProductRepository::new(),
                ChangeProducer::new(bus.clone(), config.router()),
            ),
            orders: OrderService::new(
                Arc::new(InMemoryOrderStore::new()),
                customers.clone(),
                products.clone(),
            ),
            config,
            bus,
            customers,
            products,
        }
    }

    impl System {
        fn start(&self) -> ReplicationHandle {
            Replication::start(
                &self.config,
                self.bus.clone(),
                self.customers.clone(),
                self.products.clone(),
            )
            .unwrap()
        }
    }

    /// Replication is asynchronous: poll until `done` or give up.
    fn eventually(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        done()
    }

    fn acme() -> CustomerDraft {
        CustomerDraft {
            name: "Acme".to_string(),
            email: "a@x.com".to_string(),
            phone: "555".to_string(),
            shipping_address: None,
            billing_address: None,
        }
    }

    fn widget() -> ProductDraft {
        ProductDraft {
            name: "Widget".to_string(),
            quantity: 10,
            price: 2.5,
        }
    }

    fn order_for(customer: CustomerId, product: ProductId, quantity: i32) -> OrderDraft {
        OrderDraft {
            status: OrderStatus::New,
            customer_id: customer,
            items: vec![OrderLine {
                product_id: product,
                quantity,
            }],
        }
    }

    #[test]
    fn committed_entities_are_replicated_and_usable_by_orders() {
        let system = setup();
        let replication = system.start();

        let customer = system.customer_service.create(acme()).unwrap();
        let product = system.product_service.create(widget()).unwrap();

        assert!(eventually(|| {
            system.customers.exists(customer.id()).unwrap()
                && system.products.exists(product.id()).unwrap()
        }));

        let replica = system.customers.find(customer.id()).unwrap().unwrap().row;
        assert_eq!(replica.name, "Acme");
        assert_eq!(replica.email, "a@x.com");

        let order = system
            .orders
            .create_order(&order_for(customer.id(), product.id(), 2))
            .unwrap();
        assert_eq!(system.orders.items_of(order.id).unwrap().len(), 1);
        assert!(system.orders.product_exists(product.id()).unwrap());

        replication.shutdown();
    }

    #[test]
    fn order_for_unreplicated_customer_is_not_found() {
        let system = setup();
        let replication = system.start();

        let product = system.product_service.create(widget()).unwrap();
        assert!(eventually(|| system.products.exists(product.id()).unwrap()));

        let err = system
            .orders
            .create_order(&order_for(CustomerId::new(99), product.id(), 2))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(system.orders.list_orders().unwrap().is_empty());

        replication.shutdown();
    }

    #[test]
    fn updates_and_deletes_follow_the_owner() {
        let system = setup();
        let replication = system.start();

        let customer = system.customer_service.create(acme()).unwrap();
        system
            .customer_service
            .update(
                customer.id(),
                CustomerDraft {
                    name: "Acme Corp".to_string(),
                    ..acme()
                },
            )
            .unwrap();
        let product = system.product_service.create(widget()).unwrap();
        system.product_service.delete(product.id()).unwrap();

        assert!(eventually(|| {
            system
                .customers
                .find(customer.id())
                .unwrap()
                .is_some_and(|r| r.row.name == "Acme Corp")
        }));
        // Both product events (create, delete) share one partition.
        let route = system
            .config
            .router()
            .route(EntityType::Product, &product.id().to_string());
        let spec = SubscriptionSpec::new(
            route.topic,
            system.config.group(EntityType::Product),
            route.partition,
        );
        assert!(eventually(|| system.bus.committed_offset(&spec) == 2));
        assert!(!system.products.exists(product.id()).unwrap());

        let err = system
            .orders
            .create_order(&order_for(customer.id(), product.id(), 1))
            .unwrap_err();
        assert!(err.is_not_found());

        replication.shutdown();
    }

    #[test]
    fn poison_message_is_dead_lettered_and_partition_keeps_flowing() {
        let system = setup();
        let replication = system.start();

        let router = system.config.router();
        let topic = router.topic_for(EntityType::Product).to_string();
        system
            .bus
            .publish(KeyedMessage {
                topic: topic.clone(),
                partition: 0,
                key: "13".to_string(),
                payload: "not json".to_string(),
            })
            .unwrap();

        let product = system.product_service.create(widget()).unwrap();

        assert!(eventually(|| system.products.exists(product.id()).unwrap()));
        assert!(eventually(|| system.bus.dead_letters().len() == 1));

        let dead = system.bus.dead_letters();
        assert_eq!(dead[0].topic, topic);
        assert_eq!(dead[0].group, "order-service-product");
        assert_eq!(dead[0].payload, "not json");

        replication.shutdown();
    }

    #[test]
    fn restarted_group_catches_up_on_missed_changes() {
        let system = setup();

        let first = system.start();
        let customer = system.customer_service.create(acme()).unwrap();
        assert!(eventually(|| system.customers.exists(customer.id()).unwrap()));
        first.shutdown();

        // Consumer down: the owner keeps committing and publishing.
        system
            .customer_service
            .update(
                customer.id(),
                CustomerDraft {
                    phone: "777".to_string(),
                    ..acme()
                },
            )
            .unwrap();
        let late = system.product_service.create(widget()).unwrap();

        let second = system.start();
        assert!(eventually(|| {
            system.products.exists(late.id()).unwrap()
                && system
                    .customers
                    .find(customer.id())
                    .unwrap()
                    .is_some_and(|r| r.row.phone == "777")
        }));
        assert_eq!(system.customers.len(), 1);

        second.shutdown();
    }
}
